//! Command-line surface: argument definitions and command handlers.

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

use crate::config::Config;
use crate::error::{AutocapError, Result};
use crate::glossary::{parse_glossary_file, parse_glossary_text, GlossaryStore};
use crate::job::{JobId, JobKind, JobOptions};
use crate::pipeline::Pipeline;
use crate::progress::EventBody;
use crate::queue::JobQueue;
use crate::translate::TranslationBackend;

#[derive(Debug, Parser)]
#[command(name = "autocap", version, about = "Batch subtitle generation and translation")]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file path (defaults to ./config.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit machine-readable progress as one JSON object per line
    #[arg(long, global = true)]
    pub ndjson: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate subtitles from a video or audio file
    Process(ProcessArgs),
    /// Translate an existing .srt subtitle file
    TranslateSrt(TranslateSrtArgs),
    /// Queue several inputs and process them one by one
    Batch(BatchArgs),
    /// Inspect or edit the saved glossary
    Glossary {
        #[command(subcommand)]
        action: GlossaryAction,
    },
    /// Delete extracted audio, produced subtitles, and job logs
    ClearHistory {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

/// Options shared by every job-producing command.
#[derive(Debug, Clone, Args)]
pub struct JobOptionArgs {
    /// Source language code, or `auto` to detect
    #[arg(long, default_value = "auto")]
    pub source_lang: String,

    /// Target language code, `auto` to pick one, `none` to skip translation
    #[arg(long, default_value = "auto")]
    pub target_lang: String,

    /// Transcription model override
    #[arg(long)]
    pub model: Option<String>,

    /// Extra transcription prompt text
    #[arg(long)]
    pub prompt: Option<String>,

    /// Glossary file (.json or `term = translation` lines)
    #[arg(long)]
    pub glossary: Option<PathBuf>,

    /// Inline glossary entries, `term = translation` per line
    #[arg(long)]
    pub glossary_text: Option<String>,

    /// Single glossary entry for this job (`term = translation`,
    /// repeatable, overrides every other glossary source)
    #[arg(long = "term")]
    pub terms: Vec<String>,

    /// Translation backend: local or cloud
    #[arg(long)]
    pub backend: Option<TranslationBackend>,

    /// Cloud provider (gpt, gemini)
    #[arg(long)]
    pub provider: Option<String>,

    /// Cloud model override
    #[arg(long)]
    pub provider_model: Option<String>,

    /// Cloud API key (overrides the configured one)
    #[arg(long)]
    pub api_key: Option<String>,
}

impl From<JobOptionArgs> for JobOptions {
    fn from(args: JobOptionArgs) -> Self {
        Self {
            source_lang: args.source_lang,
            target_lang: args.target_lang,
            model: args.model,
            prompt: args.prompt,
            glossary_text: args.glossary_text,
            glossary_file: args.glossary,
            glossary_terms: parse_glossary_text(&args.terms.join("\n")),
            backend: args.backend,
            provider: args.provider,
            provider_model: args.provider_model,
            api_key: args.api_key,
        }
    }
}

#[derive(Debug, Args)]
pub struct ProcessArgs {
    /// Input video or audio file
    pub input: PathBuf,

    #[command(flatten)]
    pub options: JobOptionArgs,
}

#[derive(Debug, Args)]
pub struct TranslateSrtArgs {
    /// Input .srt file
    pub input: PathBuf,

    #[command(flatten)]
    pub options: JobOptionArgs,
}

#[derive(Debug, Args)]
pub struct BatchArgs {
    /// Input files or directories (scanned recursively), processed in
    /// the given order
    pub inputs: Vec<PathBuf>,

    #[command(flatten)]
    pub options: JobOptionArgs,
}

#[derive(Debug, Subcommand)]
pub enum GlossaryAction {
    /// Print the saved entries
    Show,
    /// Merge entries from a file or inline text into the store
    Save {
        /// Glossary file to merge
        #[arg(long)]
        file: Option<PathBuf>,
        /// Inline entries, `term = translation` per line
        #[arg(long)]
        text: Option<String>,
    },
    /// Delete all saved entries
    Clear,
}

impl Cli {
    /// Load the effective configuration: the explicit path, else a
    /// `config.toml` next to the working directory, else defaults.
    pub fn load_config(&self) -> Result<Config> {
        if let Some(path) = &self.config {
            return Config::from_file(path);
        }
        let default_path = Path::new("config.toml");
        if default_path.is_file() {
            return Config::from_file(default_path);
        }
        Ok(Config::default())
    }
}

fn job_kind_for(input: &Path) -> JobKind {
    match input.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("srt") => JobKind::Subtitle,
        _ => JobKind::Media,
    }
}

const BATCH_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "mov", "webm", "mp3", "wav", "m4a", "flac", "srt",
];

fn has_batch_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            BATCH_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

/// Expand batch inputs: files pass through, directories are scanned
/// recursively for known media and subtitle extensions in name order.
fn expand_inputs(inputs: Vec<PathBuf>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            for entry in walkdir::WalkDir::new(&input).sort_by_file_name() {
                let entry = entry.map_err(|e| {
                    AutocapError::Config(format!("Failed to scan {}: {}", input.display(), e))
                })?;
                if entry.file_type().is_file() && has_batch_extension(entry.path()) {
                    files.push(entry.into_path());
                }
            }
        } else {
            files.push(input);
        }
    }
    Ok(files)
}

pub async fn run(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Command::Process(args) => {
            run_jobs(
                &config,
                vec![(JobKind::Media, args.input, args.options.into())],
                cli.ndjson,
            )
            .await
        }
        Command::TranslateSrt(args) => {
            run_jobs(
                &config,
                vec![(JobKind::Subtitle, args.input, args.options.into())],
                cli.ndjson,
            )
            .await
        }
        Command::Batch(args) => {
            let inputs = expand_inputs(args.inputs)?;
            if inputs.is_empty() {
                return Err(AutocapError::Config("No input files given".to_string()));
            }
            let options: JobOptions = args.options.into();
            let jobs = inputs
                .into_iter()
                .map(|input| (job_kind_for(&input), input, options.clone()))
                .collect();
            run_jobs(&config, jobs, cli.ndjson).await
        }
        Command::Glossary { action } => run_glossary(&config, action),
        Command::ClearHistory { yes } => run_clear_history(&config, yes).await,
    }
}

/// Submit the given jobs, run the queue to completion, and render each
/// job's event stream in submission order.
async fn run_jobs(
    config: &Config,
    jobs: Vec<(JobKind, PathBuf, JobOptions)>,
    ndjson: bool,
) -> Result<()> {
    let queue = JobQueue::new(config.paths.logs_dir());
    let glossary_store = Arc::new(GlossaryStore::load(&config.glossary.store_path));
    let pipeline = Pipeline::new(config.clone(), glossary_store);

    let mut receivers = Vec::new();
    for (kind, input, options) in jobs {
        let id = queue.submit(kind, input, options).await;
        receivers.push((id, queue.subscribe(id).await));
    }

    let render = async {
        let mut all_succeeded = true;
        for (id, mut rx) in receivers {
            let succeeded = if ndjson {
                render_ndjson(&mut rx).await?
            } else {
                render_human(id, &mut rx).await
            };
            all_succeeded &= succeeded;
        }
        Ok::<bool, AutocapError>(all_succeeded)
    };

    let (_, all_succeeded) = tokio::join!(queue.run_until_idle(&pipeline), render);
    if all_succeeded? {
        Ok(())
    } else {
        Err(AutocapError::Queue("One or more jobs failed".to_string()))
    }
}

async fn render_ndjson(
    rx: &mut tokio::sync::mpsc::UnboundedReceiver<crate::progress::ProgressEvent>,
) -> Result<bool> {
    let mut succeeded = true;
    while let Some(event) = rx.recv().await {
        print!("{}", event.encode_line()?);
        if event.body.is_terminal() {
            succeeded = matches!(event.body, EventBody::Result { .. });
            break;
        }
    }
    Ok(succeeded)
}

async fn render_human(
    job_id: JobId,
    rx: &mut tokio::sync::mpsc::UnboundedReceiver<crate::progress::ProgressEvent>,
) -> bool {
    let mut bar: Option<ProgressBar> = None;
    let mut succeeded = true;

    while let Some(event) = rx.recv().await {
        match event.body {
            EventBody::Progress {
                message,
                current: Some(current),
                total: Some(total),
                ..
            } => {
                let bar = bar.get_or_insert_with(|| {
                    let bar = ProgressBar::new(total as u64);
                    if let Ok(style) = ProgressStyle::with_template(
                        "{msg} [{bar:30}] {pos}/{len}",
                    ) {
                        bar.set_style(style);
                    }
                    bar
                });
                bar.set_length(total as u64);
                bar.set_position(current as u64);
                bar.set_message(message);
            }
            EventBody::Progress { message, .. } => {
                if let Some(bar) = &bar {
                    bar.println(&message);
                } else {
                    println!("{}", message);
                }
            }
            EventBody::Result { files, .. } => {
                if let Some(bar) = bar.take() {
                    bar.finish_and_clear();
                }
                println!("Job {} completed:", job_id);
                for file in files {
                    println!("  {}: {}", file.label, file.file);
                }
                break;
            }
            EventBody::Error { message, log } => {
                if let Some(bar) = bar.take() {
                    bar.finish_and_clear();
                }
                eprintln!("Job {} failed: {}", job_id, message);
                if let Some(log) = log {
                    eprintln!("  log: {}", log);
                }
                succeeded = false;
                break;
            }
        }
    }
    succeeded
}

fn run_glossary(config: &Config, action: GlossaryAction) -> Result<()> {
    let store = GlossaryStore::load(&config.glossary.store_path);
    match action {
        GlossaryAction::Show => {
            let entries = store.snapshot();
            if entries.is_empty() {
                println!("Glossary is empty");
            } else {
                for (term, translation) in entries {
                    println!("{} = {}", term, translation);
                }
            }
            Ok(())
        }
        GlossaryAction::Save { file, text } => {
            let mut additions = file
                .as_deref()
                .map(parse_glossary_file)
                .unwrap_or_default();
            if let Some(text) = text {
                additions.extend(parse_glossary_text(&text));
            }
            if additions.is_empty() {
                return Err(AutocapError::Config(
                    "No glossary entries given (use --file or --text)".to_string(),
                ));
            }
            let count = additions.len();
            store.append(&additions)?;
            println!("Saved {} glossary entries", count);
            Ok(())
        }
        GlossaryAction::Clear => {
            store.replace(Default::default())?;
            println!("Glossary cleared");
            Ok(())
        }
    }
}

async fn run_clear_history(config: &Config, yes: bool) -> Result<()> {
    if !yes {
        return Err(AutocapError::Config(
            "clear-history deletes all produced files; re-run with --yes to confirm".to_string(),
        ));
    }
    for dir in [
        config.paths.videos_dir(),
        config.paths.audios_dir(),
        config.paths.transcripts_dir(),
        config.paths.logs_dir(),
    ] {
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!("Failed to remove {}: {}", dir.display(), e);
                return Err(e.into());
            }
        }
        tokio::fs::create_dir_all(&dir).await?;
    }
    println!("History cleared");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_process_defaults_to_auto_languages() {
        let cli = Cli::parse_from(["autocap", "process", "talk.mp4"]);
        let Command::Process(args) = cli.command else {
            panic!("expected process command");
        };
        assert_eq!(args.options.source_lang, "auto");
        assert_eq!(args.options.target_lang, "auto");
    }

    #[test]
    fn test_batch_kind_detection() {
        assert_eq!(job_kind_for(Path::new("a.srt")), JobKind::Subtitle);
        assert_eq!(job_kind_for(Path::new("a.SRT")), JobKind::Subtitle);
        assert_eq!(job_kind_for(Path::new("a.mp4")), JobKind::Media);
        assert_eq!(job_kind_for(Path::new("noext")), JobKind::Media);
    }

    #[test]
    fn test_term_flags_become_job_glossary_terms() {
        let cli = Cli::parse_from([
            "autocap",
            "process",
            "talk.mp4",
            "--term",
            "GPU = 显卡",
            "--term",
            "LoRA -> LoRA",
        ]);
        let Command::Process(args) = cli.command else {
            panic!("expected process command");
        };
        let options: JobOptions = args.options.into();
        assert_eq!(options.glossary_terms.len(), 2);
        assert_eq!(
            options.glossary_terms.get("GPU").map(String::as_str),
            Some("显卡")
        );
    }

    #[test]
    fn test_expand_inputs_scans_directories() {
        use assert_fs::prelude::*;

        let dir = assert_fs::TempDir::new().unwrap();
        dir.child("b.mp4").touch().unwrap();
        dir.child("a.srt").touch().unwrap();
        dir.child("notes.txt").touch().unwrap();
        dir.child("nested/c.mkv").touch().unwrap();

        let files = expand_inputs(vec![dir.path().to_path_buf()]).unwrap();
        let names: Vec<String> = files
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
            .collect();
        assert_eq!(names, vec!["a.srt", "b.mp4", "c.mkv"]);
    }

    #[test]
    fn test_expand_inputs_passes_files_through() {
        let files =
            expand_inputs(vec![PathBuf::from("x.mp4"), PathBuf::from("y.srt")]).unwrap();
        assert_eq!(files, vec![PathBuf::from("x.mp4"), PathBuf::from("y.srt")]);
    }

    #[tokio::test]
    async fn test_clear_history_requires_confirmation() {
        let dir = assert_fs::TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths.data_dir = dir.path().to_path_buf();

        let err = run_clear_history(&config, false).await.unwrap_err();
        assert!(err.to_string().contains("--yes"));
    }

    #[tokio::test]
    async fn test_clear_history_wipes_data_dirs() {
        use assert_fs::prelude::*;

        let dir = assert_fs::TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths.data_dir = dir.path().to_path_buf();
        dir.child("transcripts/talk.en.srt").touch().unwrap();
        dir.child("logs/old.log.jsonl").touch().unwrap();

        run_clear_history(&config, true).await.unwrap();
        assert!(!dir.path().join("transcripts/talk.en.srt").exists());
        assert!(config.paths.transcripts_dir().is_dir());
        assert!(config.paths.logs_dir().is_dir());
    }

    #[test]
    fn test_backend_flag_parses() {
        let cli = Cli::parse_from([
            "autocap",
            "process",
            "talk.mp4",
            "--backend",
            "cloud",
            "--api-key",
            "sk-test",
        ]);
        let Command::Process(args) = cli.command else {
            panic!("expected process command");
        };
        assert_eq!(args.options.backend, Some(TranslationBackend::Cloud));
        assert_eq!(args.options.api_key.as_deref(), Some("sk-test"));
    }
}
