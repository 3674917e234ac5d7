//! Command-line entry point — chordcheck.
//!
//! Listens on the default microphone and verifies a single expected chord,
//! printing verdicts to stdout.  Intended for smoke-testing the pipeline;
//! a practice UI embeds [`chordcheck::ChordVerifier`] directly instead.
//!
//! # Usage
//!
//! ```text
//! chordcheck E,G,B --root E --k 2
//! chordcheck 0,4,7 --policy bass
//! chordcheck C,E,G --model-path ./nmp.onnx
//! ```
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Parse the expected chord from argv.
//! 3. Load [`VerifierConfig`] from disk (defaults on first run).
//! 4. Resolve and load the ONNX transcription model.
//! 5. Create the tokio runtime, start the verifier, and print verdicts
//!    until ctrl-c.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};

use chordcheck::model::{find_model_by_id, ModelPaths};
use chordcheck::{
    AppPaths, ChordSpec, ChordVerifier, OnnxTranscriber, PitchClass, Verdict, VerifierConfig,
    VerifyPolicy,
};

// ---------------------------------------------------------------------------
// Argument parsing
// ---------------------------------------------------------------------------

/// Everything the CLI accepts.
#[derive(Debug)]
struct CliArgs {
    spec: ChordSpec,
    policy: Option<VerifyPolicy>,
    transpose: Option<i32>,
    model_path: Option<PathBuf>,
}

/// Parse a pitch class from a note name (`"F#"`) or a number (`"6"`).
fn parse_pitch_class(token: &str) -> Result<PitchClass> {
    let names = [
        ("C", 0u8),
        ("C#", 1),
        ("DB", 1),
        ("D", 2),
        ("D#", 3),
        ("EB", 3),
        ("E", 4),
        ("F", 5),
        ("F#", 6),
        ("GB", 6),
        ("G", 7),
        ("G#", 8),
        ("AB", 8),
        ("A", 9),
        ("A#", 10),
        ("BB", 10),
        ("B", 11),
    ];

    let upper = token.trim().to_uppercase();
    if let Some(&(_, value)) = names.iter().find(|(name, _)| *name == upper) {
        return Ok(PitchClass::new(value).expect("table values are < 12"));
    }

    let value: u8 = upper
        .parse()
        .map_err(|_| anyhow!("not a pitch class: {token:?}"))?;
    PitchClass::new(value).ok_or_else(|| anyhow!("pitch class out of range 0..=11: {token:?}"))
}

/// Parse `"E,G,B"` (or `"4,7,11"`) into a pitch-class list.
fn parse_chord(token: &str) -> Result<Vec<PitchClass>> {
    token
        .split(',')
        .filter(|part| !part.trim().is_empty())
        .map(parse_pitch_class)
        .collect()
}

fn parse_args(args: &[String]) -> Result<CliArgs> {
    let mut chord: Option<Vec<PitchClass>> = None;
    let mut k: Option<usize> = None;
    let mut root: Option<PitchClass> = None;
    let mut policy: Option<VerifyPolicy> = None;
    let mut transpose: Option<i32> = None;
    let mut model_path: Option<PathBuf> = None;

    fn next_value<'a>(
        iter: &mut std::slice::Iter<'a, String>,
        name: &str,
    ) -> Result<&'a String> {
        iter.next().ok_or_else(|| anyhow!("{name} needs a value"))
    }

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--k" => k = Some(next_value(&mut iter, "--k")?.parse().context("--k")?),
            "--root" => root = Some(parse_pitch_class(next_value(&mut iter, "--root")?)?),
            "--transpose" => {
                transpose = Some(
                    next_value(&mut iter, "--transpose")?
                        .parse()
                        .context("--transpose")?,
                )
            }
            "--model-path" => {
                model_path = Some(PathBuf::from(next_value(&mut iter, "--model-path")?))
            }
            "--policy" => {
                policy = Some(match next_value(&mut iter, "--policy")?.to_lowercase().as_str() {
                    "k-of-n" | "kofn" => VerifyPolicy::KOfN,
                    "target" | "includes-target" => VerifyPolicy::IncludesTarget,
                    "bass" | "bass-priority" => VerifyPolicy::BassPriority,
                    other => bail!("unknown policy: {other:?}"),
                })
            }
            other if other.starts_with("--") => bail!("unknown flag: {other}"),
            other => {
                if chord.is_some() {
                    bail!("expected exactly one chord argument, got a second: {other:?}");
                }
                chord = Some(parse_chord(other)?);
            }
        }
    }

    let pcs = chord.ok_or_else(|| anyhow!("no expected chord given"))?;
    let spec = match k {
        Some(k) => ChordSpec::new(pcs, k, root)?,
        None => ChordSpec::with_default_k(pcs, root)?,
    };

    Ok(CliArgs {
        spec,
        policy,
        transpose,
        model_path,
    })
}

fn usage() -> &'static str {
    "usage: chordcheck <chord> [--k N] [--root PC] [--transpose N] \
     [--policy k-of-n|target|bass] [--model-path FILE]\n\
     \n\
     <chord> is a comma-separated list of pitch classes, by name or number:\n\
       chordcheck E,G,B --root E\n\
       chordcheck 0,4,7 --k 3 --policy bass"
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // 2. Arguments
    let raw: Vec<String> = std::env::args().skip(1).collect();
    if raw.is_empty() || raw.iter().any(|a| a == "--help" || a == "-h") {
        println!("{}", usage());
        return Ok(());
    }
    let args = parse_args(&raw)?;

    // 3. Configuration (+ CLI overrides)
    let mut config = VerifierConfig::load().unwrap_or_else(|e| {
        log::warn!("failed to load config ({e}); using defaults");
        VerifierConfig::default()
    });
    if let Some(policy) = args.policy {
        config.policy.policy = policy;
    }
    if let Some(transpose) = args.transpose {
        config.policy.transpose_semitones = transpose;
    }

    // 4. Model
    let model_path = match &args.model_path {
        Some(path) => path.clone(),
        None => {
            let info = find_model_by_id(&config.model.model)
                .ok_or_else(|| anyhow!("unknown model id in config: {}", config.model.model))?;
            let paths = ModelPaths::from_app_paths(&AppPaths::new());
            let path = paths.model_path(info);
            if !paths.is_available(info) {
                bail!(
                    "model file missing: {} — download {} from {} and place it there",
                    path.display(),
                    info.display_name,
                    info.source_url
                );
            }
            path
        }
    };
    let transcriber = Arc::new(
        OnnxTranscriber::load(&model_path, config.model.intra_threads)
            .with_context(|| format!("loading {}", model_path.display()))?,
    );

    // 5. Runtime + verifier
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    let mut verifier = ChordVerifier::new(config, transcriber)?;
    verifier.on_result(|verdict: &Verdict| match verdict {
        Verdict::Match { t } => println!("[{t:8.3}s]  MATCH"),
        Verdict::Miss { t, matched, missing } => {
            let fmt = |pcs: &[PitchClass]| {
                pcs.iter().map(|pc| pc.name()).collect::<Vec<_>>().join(",")
            };
            println!(
                "[{t:8.3}s]  miss   heard: [{}]  missing: [{}]",
                fmt(matched),
                fmt(missing)
            );
        }
        Verdict::Error { message } => eprintln!("error: {message}"),
        Verdict::Tick { t, inference_ms } => {
            log::debug!("tick t={t:.3}s inference={inference_ms:.1}ms")
        }
        Verdict::Notes { notes, .. } => log::trace!("notes: {notes:?}"),
    });

    println!("expecting {}  (ctrl-c to stop)", args.spec);
    verifier.set_expected(args.spec);

    rt.block_on(async {
        verifier.start()?;
        tokio::signal::ctrl_c().await.context("signal handler")?;
        anyhow::Ok(())
    })?;

    verifier.stop();
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
