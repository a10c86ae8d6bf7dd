use crate::core::filemap::Filemap;
use crate::core::prompt::{build_edit_instruction, build_generate_prompt, count_tokens};
use crate::core::update_review::{apply_review, review_items, review_updates};
use crate::domain::errors::FilemapError;
use crate::domain::models::{OutputFormat, RequestConfig, WriteReport};
use crate::infra::backend::{TextBackend, create_backend};
use crate::infra::config::{Config, FlagOverrides};
use crate::infra::logger::setup_logger;
use crate::infra::output::{print_write_summary, write_output};
use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use log::{debug, info, warn};
use std::path::Path;

#[derive(Parser)]
#[command(name = "copilot-ops")]
#[command(about = "Ask a language model to change your files", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Send the files and the request to the completion endpoint
    Generate(RequestArgs),
    /// Send the files to the edit endpoint with the request as instruction
    Edit(RequestArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RequestArgs {
    /// Requested changes in natural language
    #[arg(short, long, default_value = "")]
    pub request: String,

    /// Write changes to the files instead of printing them
    #[arg(short, long)]
    pub write: bool,

    /// Path to the root of the repo
    #[arg(short, long, default_value = ".")]
    pub path: String,

    /// File to include (repeatable)
    #[arg(short = 'f', long = "file")]
    pub files: Vec<String>,

    /// Fileset from the config file to include (repeatable)
    #[arg(short = 's', long = "fileset")]
    pub filesets: Vec<String>,

    /// How to format printed output: raw or json
    #[arg(short, long)]
    pub output: Option<String>,

    /// AI backend to use
    #[arg(short, long)]
    pub backend: Option<String>,

    /// Maximum number of tokens to generate
    #[arg(short, long)]
    pub ntokens: Option<u32>,

    /// Number of completions to request
    #[arg(short = 'c', long)]
    pub ncompletions: Option<u32>,

    /// Base URL of the backend API
    #[arg(short, long)]
    pub url: Option<String>,

    /// Pick which updated files to write in an interactive list
    #[arg(long)]
    pub review: bool,

    /// Copy printed output to the clipboard
    #[arg(long)]
    pub clipboard: bool,

    /// Print to this file instead of stdout
    #[arg(long = "out")]
    pub out: Option<String>,

    /// Print the request that would be sent and stop
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Generate,
    Edit,
}

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logger(cli.verbose)?;

    match cli.command {
        Commands::Generate(args) => {
            info!("Starting generate command");
            run_request(Mode::Generate, &args)
        }
        Commands::Edit(args) => {
            info!("Starting edit command");
            run_request(Mode::Edit, &args)
        }
    }
}

fn run_request(mode: Mode, args: &RequestArgs) -> anyhow::Result<()> {
    debug!("Command parameters: {:?}", args);

    let root = Path::new(&args.path);
    let mut config = Config::load(root)?;
    config.apply_env(|key| std::env::var(key).ok())?;
    config.apply_flags(&FlagOverrides {
        backend: args.backend.clone(),
        ntokens: args.ntokens,
        ncompletions: args.ncompletions,
        url: args.url.clone(),
    })?;
    config.log_as_json();

    let request = request_config(args, &config)?;

    if request.dry_run {
        let filemap = load_filemap(mode, &request, &config)?;
        return write_output(
            &render_request(mode, &filemap, &request.user_request),
            request.output_path.clone(),
            request.clipboard_output,
        );
    }

    let backend = create_backend(&config)?;
    execute(mode, &request, &config, backend.as_ref())
}

/// Merges flags with config defaults. The output format is validated here,
/// before any file is read.
pub fn request_config(args: &RequestArgs, config: &Config) -> anyhow::Result<RequestConfig> {
    let output_format = match &args.output {
        Some(format) => format.parse::<OutputFormat>()?,
        None => config.output.unwrap_or_default(),
    };

    Ok(RequestConfig {
        root_path: args.path.clone(),
        files: args.files.clone(),
        filesets: args.filesets.clone(),
        user_request: args.request.clone(),
        write: args.write,
        review: args.review,
        output_format,
        output_path: args.out.clone(),
        clipboard_output: args.clipboard,
        dry_run: args.dry_run,
    })
}

fn load_filemap(mode: Mode, request: &RequestConfig, config: &Config) -> anyhow::Result<Filemap> {
    let mut filemap = Filemap::new(&request.root_path);
    filemap
        .load(&request.files, &request.filesets, config)
        .context("Failed to load files")?;

    if filemap.is_empty() {
        if mode == Mode::Edit {
            bail!("edit needs at least one --file or --fileset");
        }
        warn!("No files loaded; the model will only see the request");
    }
    Ok(filemap)
}

fn render_request(mode: Mode, filemap: &Filemap, user_request: &str) -> String {
    let filemap_text = filemap.encode_to_input_text();
    match mode {
        Mode::Generate => build_generate_prompt(&filemap_text, user_request),
        Mode::Edit => format!(
            "{}\n---\n{}",
            build_edit_instruction(user_request),
            filemap_text
        ),
    }
}

/// Loads, asks the backend, decodes, then prints or writes.
pub fn execute(
    mode: Mode,
    request: &RequestConfig,
    config: &Config,
    backend: &dyn TextBackend,
) -> anyhow::Result<()> {
    let mut filemap = load_filemap(mode, request, config)?;
    let filemap_text = filemap.encode_to_input_text();

    let choices = match mode {
        Mode::Generate => {
            let prompt = build_generate_prompt(&filemap_text, &request.user_request);
            info!("Requesting completion ({} tokens of prompt)", count_tokens(&prompt));
            backend.generate(&prompt)?
        }
        Mode::Edit => {
            let instruction = build_edit_instruction(&request.user_request);
            info!("Requesting edit of {} file(s)", filemap.len());
            backend.edit(&filemap_text, &instruction)?
        }
    };

    apply_first_decodable(&mut filemap, &choices)?;
    print_or_write_out(&mut filemap, request)?;
    Ok(())
}

/// Decodes the first choice that yields at least one update.
pub fn apply_first_decodable(filemap: &mut Filemap, choices: &[String]) -> anyhow::Result<usize> {
    let mut last_error = FilemapError::Decode("backend returned no choices".to_string());

    for (i, choice) in choices.iter().enumerate() {
        match filemap.decode_from_output_text(choice) {
            Ok(count) => {
                debug!("Using choice {} with {} update(s)", i, count);
                return Ok(count);
            }
            Err(e) => {
                warn!("Choice {} could not be decoded: {}", i, e);
                last_error = e;
            }
        }
    }
    Err(last_error.into())
}

/// Writes the updates to disk when requested, otherwise prints the updated
/// files in the chosen format.
pub fn print_or_write_out(
    filemap: &mut Filemap,
    request: &RequestConfig,
) -> anyhow::Result<Option<WriteReport>> {
    if request.write {
        let accepted = review_updates(review_items(filemap), request.review)?;
        apply_review(filemap, &accepted);

        let report = filemap.write_updates_to_files()?;
        print_write_summary(&report)?;
        return Ok(Some(report));
    }

    let rendered = filemap.encode_to_input_text_full_paths(request.output_format)?;
    write_output(
        &rendered,
        request.output_path.clone(),
        request.clipboard_output,
    )?;
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::marker_line;
    use crate::infra::config::Fileset;
    use std::cell::RefCell;
    use std::fs;
    use tempfile::TempDir;

    struct FakeBackend {
        responses: Vec<String>,
        prompts: RefCell<Vec<String>>,
    }

    impl FakeBackend {
        fn new(responses: &[&str]) -> Self {
            Self {
                responses: responses.iter().map(|r| r.to_string()).collect(),
                prompts: RefCell::new(Vec::new()),
            }
        }
    }

    impl TextBackend for FakeBackend {
        fn generate(&self, prompt: &str) -> anyhow::Result<Vec<String>> {
            self.prompts.borrow_mut().push(prompt.to_string());
            Ok(self.responses.clone())
        }

        fn edit(&self, input: &str, instruction: &str) -> anyhow::Result<Vec<String>> {
            self.prompts
                .borrow_mut()
                .push(format!("{}\n{}", instruction, input));
            Ok(self.responses.clone())
        }
    }

    fn parse_args(extra: &[&str]) -> RequestArgs {
        let mut argv = vec!["copilot-ops", "generate"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Generate(args) => args,
            Commands::Edit(_) => unreachable!(),
        }
    }

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from([
            "copilot-ops",
            "-vv",
            "edit",
            "--request",
            "Add a readiness probe",
            "-f",
            "deploy.yaml",
            "-f",
            "svc.yaml",
            "--fileset",
            "k8s",
            "-o",
            "raw",
            "-n",
            "64",
            "-w",
            "--review",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Edit(args) => {
                assert_eq!(args.request, "Add a readiness probe");
                assert_eq!(args.files, vec!["deploy.yaml", "svc.yaml"]);
                assert_eq!(args.filesets, vec!["k8s"]);
                assert_eq!(args.output.as_deref(), Some("raw"));
                assert_eq!(args.ntokens, Some(64));
                assert_eq!(args.path, ".");
                assert!(args.write);
                assert!(args.review);
            }
            Commands::Generate(_) => panic!("expected edit"),
        }
    }

    #[test]
    fn test_request_config_validates_format() {
        let config = Config::default();
        let err = request_config(&parse_args(&["-o", "xml"]), &config).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FilemapError>(),
            Some(FilemapError::UnsupportedFormat(_))
        ));

        let request = request_config(&parse_args(&[]), &config).unwrap();
        assert_eq!(request.output_format, OutputFormat::Json);

        let config = Config {
            output: Some(OutputFormat::Raw),
            ..Config::default()
        };
        let request = request_config(&parse_args(&[]), &config).unwrap();
        assert_eq!(request.output_format, OutputFormat::Raw);
    }

    #[test]
    fn test_generate_and_write() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_string_lossy().to_string();
        fs::write(temp_dir.path().join("README.md"), "# title").unwrap();
        fs::write(temp_dir.path().join("CHANGELOG.md"), "## 0.1").unwrap();

        let config = Config {
            filesets: vec![Fileset {
                name: "docs".to_string(),
                files: vec!["README.md".to_string(), "CHANGELOG.md".to_string()],
            }],
            ..Config::default()
        };
        let args = parse_args(&["-p", &root, "-s", "docs", "-r", "add a title", "-w"]);
        let request = request_config(&args, &config).unwrap();

        let response = format!("{}\n# Better title\n", marker_line("README.md"));
        let backend = FakeBackend::new(&["garbage", &response]);

        execute(Mode::Generate, &request, &config, &backend).unwrap();

        let prompts = backend.prompts.borrow();
        assert!(prompts[0].contains("# title"));
        assert!(prompts[0].contains("add a title"));
        assert_eq!(
            fs::read_to_string(temp_dir.path().join("README.md")).unwrap(),
            "# Better title"
        );
        assert_eq!(
            fs::read_to_string(temp_dir.path().join("CHANGELOG.md")).unwrap(),
            "## 0.1"
        );
    }

    #[test]
    fn test_edit_prints_to_file_without_writing() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_string_lossy().to_string();
        let out = temp_dir.path().join("out.json").to_string_lossy().to_string();
        fs::write(temp_dir.path().join("a.txt"), "hello").unwrap();

        let args = parse_args(&["-p", &root, "-f", "a.txt", "--out", &out]);
        let request = request_config(&args, &Config::default()).unwrap();
        let backend = FakeBackend::new(&[&format!("{}\ngoodbye\n", marker_line("a.txt"))]);

        execute(Mode::Edit, &request, &Config::default(), &backend).unwrap();

        assert_eq!(
            fs::read_to_string(temp_dir.path().join("a.txt")).unwrap(),
            "hello"
        );
        let printed: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(printed[0]["content"], "goodbye");
    }

    #[test]
    fn test_edit_without_files_fails() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_string_lossy().to_string();
        let request = request_config(&parse_args(&["-p", &root]), &Config::default()).unwrap();

        let backend = FakeBackend::new(&[]);
        assert!(execute(Mode::Edit, &request, &Config::default(), &backend).is_err());
        assert!(backend.prompts.borrow().is_empty());
    }

    #[test]
    fn test_undecodable_choices_fail() {
        let mut filemap = Filemap::new(".");
        let err = apply_first_decodable(&mut filemap, &["nope".to_string()]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FilemapError>(),
            Some(FilemapError::Decode(_))
        ));

        let err = apply_first_decodable(&mut filemap, &[]).unwrap_err();
        assert!(err.to_string().contains("no choices"));
    }
}
