//! learnloop-export: dump the experience buffer as JSON Lines for offline
//! policy training.
//!
//! Opens the database read-only so it can run next to a live engine.
//!
//! Usage: `learnloop-export [--db PATH] [--student ID]`
//! Without `--db`, the configured or default database path is used.

use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{bail, Context};

use learnloop_lib::config::load_config;
use learnloop_lib::db::LearningDb;
use learnloop_lib::recommend::experience::export_experience;

struct Args {
    db: Option<PathBuf>,
    student_id: Option<i64>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args {
        db: None,
        student_id: None,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(flag) = iter.next() {
        match flag.as_str() {
            "--db" => {
                let path = iter.next().context("--db needs a path")?;
                args.db = Some(PathBuf::from(path));
            }
            "--student" => {
                let raw = iter.next().context("--student needs an id")?;
                let id = raw
                    .parse()
                    .with_context(|| format!("invalid student id '{}'", raw))?;
                args.student_id = Some(id);
            }
            other => bail!("unknown argument '{}'", other),
        }
    }
    Ok(args)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = parse_args()?;

    let path = match args.db {
        Some(path) => path,
        None => {
            let config = load_config().context("Failed to load learnloop config")?;
            match config.database_path {
                Some(path) => PathBuf::from(path),
                None => LearningDb::db_path().context("Failed to resolve database path")?,
            }
        }
    };

    let db = LearningDb::open_readonly_at(&path)
        .with_context(|| format!("Failed to open database at {}", path.display()))?;
    let tuples = export_experience(&db, args.student_id).context("Failed to read experience")?;

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for tuple in &tuples {
        serde_json::to_writer(&mut out, tuple)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;

    log::info!("Exported {} experience tuples from {}", tuples.len(), path.display());
    Ok(())
}
