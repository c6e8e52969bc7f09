//! SRT parsing, cue assembly, and the output naming convention.
//!
//! Variants produced per job: the original cue set, and - when a
//! translation happened - a translated set plus a bilingual set whose
//! cues carry the target-language line above the source-language line.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

use crate::error::{AutocapError, Result};
use crate::lang::detect_script;

/// Timestamped unit of recognized source-language text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// One-to-one translation of a [`Segment`], timings preserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslatedSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Raw SRT block as parsed from an input file, text kept line by line so
/// bilingual inputs can be picked apart.
#[derive(Debug, Clone, PartialEq)]
pub struct SrtBlock {
    pub start: f64,
    pub end: f64,
    pub lines: Vec<String>,
}

/// Timed display unit with one or two lines of text.
#[derive(Debug, Clone, PartialEq)]
pub struct Cue {
    pub index: usize,
    pub start: f64,
    pub end: f64,
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantKind {
    Original,
    Translated,
    Dual,
}

impl VariantKind {
    /// User-facing artifact label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Original => "Original Subtitles (.srt)",
            Self::Translated => "Translated Subtitles (.srt)",
            Self::Dual => "Bilingual Subtitles (Dual .srt)",
        }
    }
}

/// One assembled subtitle output: ordered cues plus the derived file name.
#[derive(Debug, Clone)]
pub struct SubtitleVariant {
    pub kind: VariantKind,
    pub cues: Vec<Cue>,
    pub file_name: String,
}

impl SubtitleVariant {
    /// Render the cue sequence as SRT text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for cue in &self.cues {
            out.push_str(&format!(
                "{}\n{} --> {}\n{}\n\n",
                cue.index,
                format_srt_time(cue.start),
                format_srt_time(cue.end),
                cue.lines.join("\n")
            ));
        }
        out
    }
}

/// Parse `HH:MM:SS,mmm` into seconds; malformed timestamps read as 0.
pub fn timestamp_to_seconds(timestamp: &str) -> f64 {
    let timestamp = timestamp.trim();
    let mut clock = timestamp.splitn(3, ':');
    let (Some(hours), Some(minutes), Some(rest)) = (clock.next(), clock.next(), clock.next())
    else {
        return 0.0;
    };
    let (seconds, millis) = rest.split_once(',').unwrap_or((rest, "0"));
    let parse = |s: &str| s.trim().parse::<u64>().ok();
    match (parse(hours), parse(minutes), parse(seconds), parse(millis)) {
        (Some(h), Some(m), Some(s), Some(ms)) => {
            (h * 3600 + m * 60 + s) as f64 + ms as f64 / 1000.0
        }
        _ => 0.0,
    }
}

/// Format seconds as an SRT timestamp (`HH:MM:SS,mmm`).
pub fn format_srt_time(seconds: f64) -> String {
    let total_milliseconds = (seconds * 1000.0).round() as u64;
    let hours = total_milliseconds / 3_600_000;
    let minutes = (total_milliseconds % 3_600_000) / 60_000;
    let secs = (total_milliseconds % 60_000) / 1_000;
    let millis = total_milliseconds % 1_000;

    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
}

/// Parse SRT content into timed blocks, ordered by start time. Blocks
/// are blank-line separated; the numeric index line is optional. Blocks
/// without a time line are skipped.
pub fn parse_srt(content: &str) -> Vec<SrtBlock> {
    let normalized = content.replace("\r\n", "\n");
    let mut blocks = Vec::new();
    let mut current: Vec<String> = Vec::new();

    let mut flush = |lines: &mut Vec<String>, blocks: &mut Vec<SrtBlock>| {
        if lines.len() < 2 {
            lines.clear();
            return;
        }
        let (time_line, text_lines) = if lines[0].contains("-->") {
            (lines[0].clone(), lines[1..].to_vec())
        } else if lines.len() >= 3 && lines[1].contains("-->") {
            (lines[1].clone(), lines[2..].to_vec())
        } else {
            lines.clear();
            return;
        };
        if let Some((start, end)) = time_line.split_once("-->") {
            blocks.push(SrtBlock {
                start: timestamp_to_seconds(start),
                end: timestamp_to_seconds(end),
                lines: text_lines,
            });
        }
        lines.clear();
    };

    for line in normalized.lines() {
        if line.trim().is_empty() {
            flush(&mut current, &mut blocks);
        } else {
            current.push(line.trim_end().to_string());
        }
    }
    flush(&mut current, &mut blocks);

    // Malformed files may carry cues out of order; downstream assembly
    // relies on non-decreasing start times.
    blocks.sort_by(|a, b| a.start.total_cmp(&b.start));
    blocks
}

/// Heuristic for already-bilingual inputs: true when at least 60% of the
/// multi-line blocks have different scripts on their first and last line.
pub fn detect_bilingual(blocks: &[SrtBlock]) -> bool {
    const THRESHOLD: f64 = 0.6;
    let mut hits = 0usize;
    let mut total = 0usize;
    for block in blocks {
        if block.lines.len() < 2 {
            continue;
        }
        let (Some(first), Some(last)) = (block.lines.first(), block.lines.last()) else {
            continue;
        };
        if first.is_empty() || last.is_empty() {
            continue;
        }
        let script_a = detect_script(first);
        let script_b = detect_script(last);
        total += 1;
        if script_a != crate::lang::Script::Unknown
            && script_b != crate::lang::Script::Unknown
            && script_a != script_b
        {
            hits += 1;
        }
    }
    total > 0 && hits as f64 / total as f64 >= THRESHOLD
}

/// Reduce parsed blocks to source-text segments. For blocks with two or
/// more lines the last line is the authoritative source text; the first
/// line is discarded regardless of its content.
pub fn extract_source_segments(blocks: &[SrtBlock]) -> Vec<Segment> {
    blocks
        .iter()
        .map(|block| {
            let text = if block.lines.len() >= 2 {
                block.lines.last().map(|l| l.trim().to_string()).unwrap_or_default()
            } else {
                block.lines.join("\n").trim().to_string()
            };
            Segment {
                start: block.start,
                end: block.end,
                text,
            }
        })
        .collect()
}

/// Output naming convention: `<base>.{source}.srt`,
/// `<base>.{source}__{target}.srt`, `<base>.{source}__{target}.dual.srt`.
pub fn build_srt_name(base: &str, source: &str, target: Option<&str>, dual: bool) -> String {
    let mut name = match target {
        Some(target) => format!("{}.{}__{}", base, source, target),
        None => format!("{}.{}", base, source),
    };
    if dual {
        name.push_str(".dual");
    }
    name.push_str(".srt");
    name
}

/// Assemble the subtitle variants for one job.
///
/// Always yields the original variant. When `translated` is present a
/// translated and a dual variant are added with identical timings; the
/// dual cues carry the target-language line first, source second. The
/// cue-count invariant is enforced here: a mismatch is an internal bug,
/// not a recoverable user error.
pub fn assemble(
    base: &str,
    segments: &[Segment],
    translated: Option<&[TranslatedSegment]>,
    source_tag: &str,
    target_tag: Option<&str>,
) -> Result<Vec<SubtitleVariant>> {
    let original_cues: Vec<Cue> = segments
        .iter()
        .enumerate()
        .map(|(i, seg)| Cue {
            index: i + 1,
            start: seg.start,
            end: seg.end,
            lines: vec![seg.text.trim().to_string()],
        })
        .collect();

    let mut variants = vec![SubtitleVariant {
        kind: VariantKind::Original,
        cues: original_cues,
        file_name: build_srt_name(base, source_tag, None, false),
    }];

    let Some(translated) = translated else {
        return Ok(variants);
    };
    let target_tag = target_tag.ok_or_else(|| {
        AutocapError::Assembly("translated segments present without a target language".to_string())
    })?;
    if translated.len() != segments.len() {
        return Err(AutocapError::Assembly(format!(
            "segment count mismatch: {} original vs {} translated",
            segments.len(),
            translated.len()
        )));
    }

    let translated_cues: Vec<Cue> = translated
        .iter()
        .enumerate()
        .map(|(i, seg)| Cue {
            index: i + 1,
            start: seg.start,
            end: seg.end,
            lines: vec![seg.text.trim().to_string()],
        })
        .collect();

    // Dual cues keep the original timings and always carry exactly two
    // lines: target language first, source language second.
    let dual_cues: Vec<Cue> = segments
        .iter()
        .zip(translated.iter())
        .enumerate()
        .map(|(i, (orig, trans))| Cue {
            index: i + 1,
            start: orig.start,
            end: orig.end,
            lines: vec![trans.text.trim().to_string(), orig.text.trim().to_string()],
        })
        .collect();

    variants.push(SubtitleVariant {
        kind: VariantKind::Translated,
        cues: translated_cues,
        file_name: build_srt_name(base, source_tag, Some(target_tag), false),
    });
    variants.push(SubtitleVariant {
        kind: VariantKind::Dual,
        cues: dual_cues,
        file_name: build_srt_name(base, source_tag, Some(target_tag), true),
    });

    Ok(variants)
}

/// Write a variant into the output directory, returning the full path.
pub async fn write_variant(variant: &SubtitleVariant, output_dir: &Path) -> Result<PathBuf> {
    let path = output_dir.join(&variant.file_name);
    fs::write(&path, variant.render()).await?;
    info!("Subtitle file written: {}", path.display());
    Ok(path)
}
