//! The job runner: wires extraction, transcription, translation, and
//! subtitle assembly into the two job flows (media file in, subtitle
//! file in).

use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::Config;
use crate::convert::{conversion_for, convert_texts, ScriptConverter, ScriptConverterFactory};
use crate::error::{AutocapError, Result};
use crate::glossary::{
    build_transcription_prompt, infer_terms_from_filename, merge_glossaries, parse_glossary_file,
    parse_glossary_text, Glossary, GlossaryStore,
};
use crate::job::{Artifact, Job, JobKind, JobOptions};
use crate::lang::{resolve_languages, Resolution};
use crate::media::{MediaExtractor, MediaExtractorFactory};
use crate::queue::{JobContext, JobRunner};
use crate::subtitle::{
    assemble, detect_bilingual, extract_source_segments, parse_srt, write_variant, Segment,
    SubtitleVariant, TranslatedSegment,
};
use crate::transcribe::{
    whisper_language_hint, TranscribeRequest, Transcript, TranscriberFactory, TranscriptionEngine,
};
use crate::translate::{BackendOverrides, TranslatorFactory};

pub struct Pipeline {
    config: Config,
    extractor: Box<dyn MediaExtractor>,
    transcriber: Box<dyn TranscriptionEngine>,
    converter: Box<dyn ScriptConverter>,
    glossary_store: Arc<GlossaryStore>,
    translator: Option<Arc<dyn crate::translate::Translator>>,
}

impl Pipeline {
    pub fn new(config: Config, glossary_store: Arc<GlossaryStore>) -> Self {
        let extractor = MediaExtractorFactory::create(config.media.clone());
        let transcriber = TranscriberFactory::create_default(config.transcriber.clone());
        Self::with_components(config, extractor, transcriber, glossary_store)
    }

    /// Construct with explicit boundary implementations.
    pub fn with_components(
        config: Config,
        extractor: Box<dyn MediaExtractor>,
        transcriber: Box<dyn TranscriptionEngine>,
        glossary_store: Arc<GlossaryStore>,
    ) -> Self {
        let converter = ScriptConverterFactory::create(config.convert.clone());
        Self {
            config,
            extractor,
            transcriber,
            converter,
            glossary_store,
            translator: None,
        }
    }

    /// Use a fixed translator instead of resolving one per job.
    pub fn with_translator(mut self, translator: Arc<dyn crate::translate::Translator>) -> Self {
        self.translator = Some(translator);
        self
    }

    /// Replace the script converter implementation.
    pub fn with_converter(mut self, converter: Box<dyn ScriptConverter>) -> Self {
        self.converter = converter;
        self
    }

    async fn ensure_dirs(&self) -> Result<()> {
        for dir in [
            self.config.paths.videos_dir(),
            self.config.paths.audios_dir(),
            self.config.paths.transcripts_dir(),
            self.config.paths.logs_dir(),
        ] {
            tokio::fs::create_dir_all(&dir).await?;
        }
        Ok(())
    }

    /// Effective glossary for one job: the saved store first, then the
    /// job's inline text, then the job's glossary file, then the job's
    /// own term additions, later sources overriding earlier on exact
    /// term match.
    fn job_glossary(&self, options: &JobOptions) -> Glossary {
        let saved = self.glossary_store.snapshot();
        let from_text = options
            .glossary_text
            .as_deref()
            .map(parse_glossary_text)
            .unwrap_or_default();
        let from_file = options
            .glossary_file
            .as_deref()
            .map(parse_glossary_file)
            .unwrap_or_default();
        merge_glossaries(&[&saved, &from_text, &from_file, &options.glossary_terms])
    }

    fn resolve_translator(
        &self,
        options: &JobOptions,
    ) -> Result<Arc<dyn crate::translate::Translator>> {
        if let Some(translator) = &self.translator {
            return Ok(translator.clone());
        }
        let overrides = BackendOverrides {
            backend: options.backend,
            provider: options.provider.as_deref(),
            model: options.provider_model.as_deref(),
            api_key: options.api_key.as_deref(),
        };
        TranslatorFactory::create(&self.config.translate, overrides)
    }

    /// Translate segments while forwarding per-segment progress into the
    /// job's event stream.
    async fn translate_segments(
        &self,
        ctx: &mut JobContext<'_>,
        segments: &[Segment],
        target: &str,
        glossary: &Glossary,
        options: &JobOptions,
    ) -> Result<Vec<TranslatedSegment>> {
        let translator = self.resolve_translator(options)?;
        translator.check_availability().await?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let progress = move |current: usize, total: usize| {
            let _ = tx.send((current, total));
        };

        let translate_fut = translator.translate_batch(segments, target, glossary, &progress);
        tokio::pin!(translate_fut);

        let translated = loop {
            tokio::select! {
                result = &mut translate_fut => break result?,
                Some((current, total)) = rx.recv() => {
                    ctx.progress_counted(
                        format!("Translating segment {}/{}", current, total),
                        "translate",
                        current,
                        total,
                    )
                    .await;
                }
            }
        };
        while let Ok((current, total)) = rx.try_recv() {
            ctx.progress_counted(
                format!("Translating segment {}/{}", current, total),
                "translate",
                current,
                total,
            )
            .await;
        }
        Ok(translated)
    }

    async fn write_artifacts(&self, variants: &[SubtitleVariant]) -> Result<Vec<Artifact>> {
        let output_dir = self.config.paths.transcripts_dir();
        let mut artifacts = Vec::with_capacity(variants.len());
        for variant in variants {
            let path = write_variant(variant, &output_dir).await?;
            let reference = pathdiff::diff_paths(&path, &output_dir)
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_else(|| variant.file_name.clone());
            artifacts.push(Artifact {
                label: variant.kind.label().to_string(),
                path,
                reference,
            });
        }
        Ok(artifacts)
    }

    async fn process_media(&self, job: &Job, ctx: &mut JobContext<'_>) -> Result<Vec<Artifact>> {
        self.ensure_dirs().await?;
        if !job.input.is_file() {
            return Err(AutocapError::FileNotFound(
                job.input.display().to_string(),
            ));
        }
        let base = output_base(&job.input)?;

        // Extract (or reuse) the audio track.
        let audio_path = self.config.paths.audios_dir().join(format!("{}.wav", base));
        if audio_path.is_file() {
            ctx.stage("extract", "Audio already extracted, skipping extraction")
                .await?;
        } else {
            ctx.stage("extract", "Extracting audio").await?;
            self.extractor.extract_audio(&job.input, &audio_path).await?;
        }

        // Transcribe with filename keywords biasing the prompt.
        let model = self.config.transcriber.resolve_model(job.options.model.as_deref())?;
        let file_name = job
            .input
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let keywords = infer_terms_from_filename(&file_name);
        let prompt = build_transcription_prompt(
            job.options.prompt.as_deref(),
            &keywords,
            self.config.glossary.max_prompt_keywords,
        );
        ctx.stage("transcribe", format!("Transcribing audio (model: {})", model))
            .await?;
        let request = TranscribeRequest {
            model,
            language: whisper_language_hint(&job.options.source_lang),
            prompt,
        };
        let mut transcript = self.transcriber.transcribe(&audio_path, &request).await?;
        if transcript.segments.is_empty() {
            return Err(AutocapError::Transcription(
                "No speech detected in the audio".to_string(),
            ));
        }
        ctx.stage(
            "transcribe",
            format!("Transcription complete: {} segments", transcript.segments.len()),
        )
        .await?;

        let resolution = resolve_languages(
            &job.options.source_lang,
            &job.options.target_lang,
            Some(&transcript.language),
            &transcript.text,
        );
        info!(
            "Resolved languages for job {}: {} -> {:?}",
            job.id, resolution.source, resolution.target
        );

        self.normalize_script(ctx, &mut transcript, &resolution.source)
            .await?;

        // Plain-text transcript alongside the subtitle outputs.
        let transcript_path = self
            .config
            .paths
            .transcripts_dir()
            .join(format!("{}.txt", base));
        tokio::fs::write(&transcript_path, &transcript.text).await?;

        let translated = self
            .maybe_translate(ctx, &transcript.segments, &resolution, &job.options)
            .await?;

        ctx.stage("assemble", "Generating subtitle files").await?;
        let variants = assemble(
            &base,
            &transcript.segments,
            translated.as_deref(),
            &resolution.source,
            resolution.target.as_deref(),
        )?;
        self.write_artifacts(&variants).await
    }

    /// Normalize transcribed Chinese to the resolved script. The engine
    /// emits whichever variant the audio happened to match, so a
    /// `zh-cn` source is converted to Simplified and `zh-tw` to
    /// Traditional. Best-effort: a missing or failing converter keeps
    /// the engine output.
    async fn normalize_script(
        &self,
        ctx: &mut JobContext<'_>,
        transcript: &mut Transcript,
        source_tag: &str,
    ) -> Result<()> {
        let Some(conversion) = conversion_for(source_tag) else {
            return Ok(());
        };
        if let Err(e) = self.converter.check_availability() {
            warn!("Script conversion unavailable, skipping: {}", e);
            ctx.stage(
                "convert",
                "Script conversion tool unavailable, keeping engine output",
            )
            .await?;
            return Ok(());
        }

        ctx.stage(
            "convert",
            format!("Normalizing Chinese script for {}", source_tag),
        )
        .await?;
        let texts: Vec<String> = transcript
            .segments
            .iter()
            .map(|s| s.text.clone())
            .collect();
        match convert_texts(self.converter.as_ref(), &texts, conversion).await {
            Ok(converted) => {
                for (segment, text) in transcript.segments.iter_mut().zip(converted) {
                    segment.text = text;
                }
            }
            Err(e) => {
                warn!("Script conversion failed, keeping engine output: {}", e);
                return Ok(());
            }
        }
        match self.converter.convert(&transcript.text, conversion).await {
            Ok(text) => transcript.text = text,
            Err(e) => warn!("Transcript text conversion failed: {}", e),
        }
        Ok(())
    }

    async fn maybe_translate(
        &self,
        ctx: &mut JobContext<'_>,
        segments: &[Segment],
        resolution: &Resolution,
        options: &JobOptions,
    ) -> Result<Option<Vec<TranslatedSegment>>> {
        if !resolution.translate {
            ctx.stage(
                "translate",
                "Target language matches source. Skipping translation.",
            )
            .await?;
            return Ok(None);
        }
        let target = resolution
            .target
            .as_deref()
            .ok_or_else(|| AutocapError::Translation("no target language resolved".to_string()))?;
        let glossary = self.job_glossary(options);
        ctx.stage(
            "translate",
            format!("Translating {} segments to {}", segments.len(), target),
        )
        .await?;
        let translated = self
            .translate_segments(ctx, segments, target, &glossary, options)
            .await?;
        Ok(Some(translated))
    }

    async fn process_subtitle(&self, job: &Job, ctx: &mut JobContext<'_>) -> Result<Vec<Artifact>> {
        self.ensure_dirs().await?;
        if !job.input.is_file() {
            return Err(AutocapError::FileNotFound(
                job.input.display().to_string(),
            ));
        }
        if job
            .input
            .extension()
            .and_then(|e| e.to_str())
            .is_none_or(|ext| !ext.eq_ignore_ascii_case("srt"))
        {
            return Err(AutocapError::UnsupportedFormat(format!(
                "Expected an .srt file: {}",
                job.input.display()
            )));
        }
        let base = output_base(&job.input)?;

        ctx.stage("parse", "Parsing subtitle file").await?;
        let content = tokio::fs::read_to_string(&job.input).await?;
        let blocks = parse_srt(&content);
        if blocks.is_empty() {
            return Err(AutocapError::UnsupportedFormat(
                "No subtitle segments found in the file".to_string(),
            ));
        }
        if detect_bilingual(&blocks) {
            ctx.stage(
                "parse",
                "Bilingual subtitle detected, using the second line of each cue",
            )
            .await?;
        }
        let segments = extract_source_segments(&blocks);
        let sample: String = segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let resolution = resolve_languages(
            &job.options.source_lang,
            &job.options.target_lang,
            None,
            &sample,
        );
        let target = resolution.target.as_deref().ok_or_else(|| {
            AutocapError::Config("Subtitle translation requires a target language".to_string())
        })?;
        if !resolution.translate {
            return Err(AutocapError::Config(format!(
                "Target language '{}' matches the source language",
                target
            )));
        }

        let glossary = self.job_glossary(&job.options);
        ctx.stage(
            "translate",
            format!("Translating {} segments to {}", segments.len(), target),
        )
        .await?;
        let translated = self
            .translate_segments(ctx, &segments, target, &glossary, &job.options)
            .await?;

        ctx.stage("assemble", "Generating subtitle files").await?;
        let variants = assemble(
            &base,
            &segments,
            Some(&translated),
            &resolution.source,
            Some(target),
        )?;
        self.write_artifacts(&variants).await
    }
}

#[async_trait::async_trait]
impl JobRunner for Pipeline {
    async fn run(&self, job: &Job, ctx: &mut JobContext<'_>) -> Result<Vec<Artifact>> {
        match job.kind {
            JobKind::Media => self.process_media(job, ctx).await,
            JobKind::Subtitle => self.process_subtitle(job, ctx).await,
        }
    }
}

/// Output base name for an input file: the stem, with the upload
/// marker suffix stripped (`talk.uploaded.srt` produces `talk`).
pub fn output_base(input: &Path) -> Result<String> {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| AutocapError::UnsupportedFormat(format!("{}", input.display())))?;
    Ok(stem
        .strip_suffix(".uploaded")
        .unwrap_or(stem)
        .to_string())
}
