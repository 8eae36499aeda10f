use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use domfuzz_sampler::{SampleBuilder, TagTypeMap};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Grammar-based test-case generator for browser fuzzing
#[derive(Parser, Debug)]
#[command(name = "domfuzz", version, about, long_about = None)]
struct Cli {
    /// Generate a single sample into this file
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Directory to put a batch of generated samples in
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Number of samples to generate in batch mode
    #[arg(short = 'n', long)]
    count: Option<usize>,

    /// Sample template with fuzzer placeholders
    #[arg(long, default_value = "template.html")]
    template: PathBuf,

    /// Directory holding html.txt, css.txt, and js.txt
    #[arg(long, default_value = "rules")]
    grammar_dir: PathBuf,

    /// Optional JSON tag→type table overriding the built-in one
    #[arg(long)]
    tag_types: Option<PathBuf>,

    /// Seed for reproducible output
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    let template = fs::read_to_string(&cli.template)
        .with_context(|| format!("reading template {}", cli.template.display()))?;

    let mut builder = SampleBuilder::from_grammar_dir(&cli.grammar_dir)
        .with_context(|| format!("loading grammars from {}", cli.grammar_dir.display()))?;
    if let Some(path) = &cli.tag_types {
        builder.set_tag_types(TagTypeMap::from_json_file(path)?);
    }

    let mut rng = match cli.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    if let Some(path) = &cli.file {
        let sample = builder.build_sample_with_rng(&template, &mut rng)?;
        fs::write(path, sample).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "wrote sample");
        return Ok(());
    }

    if let Some(out_dir) = &cli.output_dir {
        let Some(count) = cli.count else {
            bail!("batch mode needs --count to say how many samples to generate");
        };
        fs::create_dir_all(out_dir)
            .with_context(|| format!("creating {}", out_dir.display()))?;

        for index in 0..count {
            let path = out_dir.join(format!("fuzz-{index:05}.html"));
            let sample = builder.build_sample_with_rng(&template, &mut rng)?;
            fs::write(&path, sample).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "wrote sample");
        }
        return Ok(());
    }

    bail!("nothing to do: pass --file for one sample or --output-dir/--count for a batch");
}
