//! CLI argument parsing with clap.

use clap::{Args, Parser, Subcommand};

/// Image generation backend with multi-provider fallback.
#[derive(Parser, Debug)]
#[command(name = "dreamforge", version, about)]
pub struct Cli {
    /// Config file path override.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Verbose output (debug logging).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// What to do.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate one image and print its reference.
    Generate(GenerateArgs),
    /// Serve the HTTP API.
    Serve(ServeArgs),
}

/// Arguments for `generate`.
#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Text prompt describing the desired image.
    #[arg(conflicts_with = "prompt_file")]
    pub prompt: Option<String>,

    /// Path to a file containing the prompt text.
    #[arg(short = 'p', long, conflicts_with = "prompt")]
    pub prompt_file: Option<String>,

    /// Identity image: URL, data URI, or base64.
    #[arg(short, long)]
    pub identity_image: Option<String>,

    /// Prefer higher-fidelity providers.
    #[arg(long)]
    pub high_quality: bool,

    /// Requester id used for rate limiting.
    #[arg(short, long)]
    pub requester: Option<String>,

    /// Save the image here (format converted to match the extension).
    #[arg(short, long, conflicts_with = "save")]
    pub output: Option<String>,

    /// Save the image under an auto-generated name.
    #[arg(short, long)]
    pub save: bool,
}

/// Arguments for `serve`.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on.
    #[arg(short, long, default_value = "0.0.0.0:5000")]
    pub bind: String,
}

impl GenerateArgs {
    /// Resolve the prompt from either the positional argument or the file flag.
    ///
    /// # Errors
    ///
    /// Returns an error if neither prompt nor prompt-file is provided,
    /// or if the file cannot be read.
    pub fn resolve_prompt(&self) -> Result<String, std::io::Error> {
        if let Some(ref text) = self.prompt {
            Ok(text.clone())
        } else if let Some(ref path) = self.prompt_file {
            std::fs::read_to_string(path).map(|s| s.trim().to_string())
        } else {
            Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Provide a prompt string or use -p/--prompt-file",
            ))
        }
    }

    /// Whether the image should be written to disk.
    #[must_use]
    pub fn wants_file(&self) -> bool {
        self.save || self.output.is_some()
    }
}
