// Melos CLI: evolve a melody in the style of a reference MIDI file.
//
// Pipeline: read reference -> rhythm phase -> pitch phase -> write MIDI.
// The first note track of the reference is the melody the run imitates;
// its second note track, if any, is copied to the output as accompaniment.
//
// Usage:
//   cargo run -p melos_ga -- reference.mid [-o output.mid] [--config ga.json]
//     [--population N] [--mutation-rate R] [--generations N] [--bars N]
//     [--seed N] [--key NAME] [--transpose N] [--no-accompaniment]
//     [--dump-config]
//
// Progress is logged through env_logger; set RUST_LOG=debug for stage
// transitions and per-phase details.

use clap::Parser;
use melos_ga::config::GaConfig;
use melos_ga::controller::compose;
use melos_ga::error::{GaError, Result};
use melos_ga::evolution::LogProgress;
use melos_ga::midi::{read_midi, write_midi};
use melos_ga::settings::Key;
use melos_prng::MelosRng;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Parser)]
#[command(name = "melos")]
#[command(about = "Evolve a melody toward the style of a reference MIDI file")]
struct Cli {
    /// Reference MIDI file; its first note track is the melody to imitate.
    #[arg(required_unless_present = "dump_config")]
    reference: Option<PathBuf>,

    /// Output MIDI file.
    #[arg(short, long, default_value = "output.mid")]
    output: PathBuf,

    /// JSON configuration file; missing fields take their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    population: Option<usize>,

    #[arg(long)]
    mutation_rate: Option<f64>,

    /// Generation budget of each phase.
    #[arg(long)]
    generations: Option<usize>,

    /// Bars to generate (default: as many as the reference).
    #[arg(long)]
    bars: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    /// Key to compose in, e.g. C, Db, F#m (default: the reference's).
    #[arg(long)]
    key: Option<String>,

    /// Transpose the finished melody by this many semitones.
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    transpose: i16,

    /// Leave out the reference's accompaniment track.
    #[arg(long)]
    no_accompaniment: bool,

    /// Print the effective configuration as JSON and exit.
    #[arg(long)]
    dump_config: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn effective_config(cli: &Cli) -> Result<GaConfig> {
    let mut config = match &cli.config {
        Some(path) => GaConfig::load(path)?,
        None => GaConfig::default(),
    };
    if let Some(n) = cli.population {
        config.population_size = n;
    }
    if let Some(r) = cli.mutation_rate {
        config.mutation_rate = r;
    }
    if let Some(n) = cli.generations {
        config.generations = n;
    }
    if cli.bars.is_some() {
        config.bar_count = cli.bars;
    }
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    config.validate()?;
    Ok(config)
}

fn run(cli: Cli) -> Result<()> {
    let config = effective_config(&cli)?;
    if cli.dump_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }
    let Some(reference_path) = &cli.reference else {
        return Err(GaError::InvalidConfig("no reference file given".into()));
    };

    let seed = config.seed.unwrap_or_else(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0)
    });

    println!("=== Melos: genetic melody generator ===");
    println!("Reference: {}", reference_path.display());
    println!("Output: {}", cli.output.display());
    println!(
        "Population: {}, mutation rate: {}, generations per phase: {}",
        config.population_size, config.mutation_rate, config.generations
    );
    println!("Seed: {seed}");
    println!();

    println!("[1/4] Reading reference...");
    let song = read_midi(reference_path)?;
    let mut reference = song.melody()?.clone();
    if let Some(name) = &cli.key {
        reference.settings = reference.settings.with_key(Key::parse(name)?);
    }
    let s = reference.settings;
    println!(
        "  Key {}, {}/{}, {:.0} BPM, {} bars, {} notes",
        s.key.name(),
        s.numerator(),
        s.denominator(),
        s.bpm,
        reference.bar_count(),
        reference.notes.len()
    );
    println!("  {}", reference.summary());

    println!("[2/4] Evolving rhythm, then pitch...");
    let mut rng = MelosRng::new(seed);
    let mut sink = LogProgress {
        every: config.log_every,
    };
    let composition = compose(&reference, &config, &mut rng, &mut sink)?;
    let rhythm = &composition.rhythm;
    println!(
        "  Rhythm: fitness {:.3} after {} generation(s) ({:?})",
        rhythm.fitness, rhythm.generations, rhythm.stop
    );
    println!("  {}", rhythm.best.summary());

    println!("[3/4] Pitch result...");
    let Some(pitch) = &composition.pitch else {
        println!("  Cancelled before the pitch phase; nothing written.");
        return Ok(());
    };
    println!(
        "  Pitch: fitness {:.3} after {} generation(s) ({:?})",
        pitch.fitness, pitch.generations, pitch.stop
    );
    let mut melody = composition.melody;
    if cli.transpose != 0 {
        melody.transpose(cli.transpose);
        println!("  Transposed by {:+} semitone(s)", cli.transpose);
    }
    println!("  {}", melody.summary());

    println!("[4/4] Writing MIDI to {}...", cli.output.display());
    let mut tracks = vec![melody];
    let accompaniment = song.accompaniment().filter(|_| !cli.no_accompaniment);
    if let Some(accompaniment) = accompaniment {
        let mut accompaniment = accompaniment.clone();
        for note in &mut accompaniment.notes {
            note.velocity = s.velocity;
        }
        println!("  Including accompaniment ({} notes)", accompaniment.notes.len());
        tracks.push(accompaniment);
    }
    write_midi(&tracks, &cli.output)?;
    println!("  Done.");
    Ok(())
}
