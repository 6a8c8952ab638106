use std::path::PathBuf;
use std::process::exit;
use std::sync::Arc;

use anyhow::Result;
use log::info;
use uuid::Uuid;

use pixelmill::config::PipelineConfig;
use pixelmill::queue::TaskQueue;
use pixelmill::worker::{ManifestSubjectStore, Worker};

fn usage() -> ! {
    eprintln!("usage: pixelmill <init|status|dead-letters> <queue-root>");
    eprintln!("       pixelmill drain <queue-root> <subjects.json>");
    exit(2);
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let config = PipelineConfig::from_env();

    let mut args = std::env::args().skip(1);
    let (Some(command), Some(root)) = (args.next(), args.next()) else {
        usage();
    };
    let root = PathBuf::from(root);

    match command.as_str() {
        "init" => {
            TaskQueue::open(&root)?;
            info!("initialized queue layout at {root:?}");
        }
        "status" => {
            let queue = TaskQueue::open(&root)?;
            let status = queue.status(config.lease_ttl())?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        "dead-letters" => {
            let queue = TaskQueue::open(&root)?;
            let dead = queue.dead_letters()?;
            if dead.is_empty() {
                println!("no dead letters");
            }
            for record in dead {
                println!(
                    "{}  {}  {}  attempts={}  error={}",
                    record.file_name,
                    record.task.kind.label(),
                    record.task.kind.subject(),
                    record.task.attempts,
                    record.task.last_error.as_deref().unwrap_or("-"),
                );
            }
        }
        "drain" => {
            let Some(manifest) = args.next() else {
                usage();
            };
            let queue = Arc::new(TaskQueue::open(&root)?);
            let subjects = Arc::new(ManifestSubjectStore::load(&manifest)?);
            let worker = Worker::new(queue, subjects, Arc::new(config), Uuid::new_v4());
            // Runs in the foreground until the queue stays drained past
            // the idle grace period. Bows out if a live worker already
            // owns the lease.
            worker.run();
        }
        _ => usage(),
    }
    Ok(())
}
