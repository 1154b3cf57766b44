use crate::audit::{Severity, audit_plan};
use crate::config::{Config, load_config};
use crate::layout;
use crate::persist::{StoredPlan, from_stored, read_plan, write_plan};
use crate::store::Plan;
use crate::validate::detect_cycles;
use anyhow::Result;
use clap::Parser;
use log::info;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "planboard", version, about = "Plan graph checker and organizer")]
pub struct Args {
    /// Input plan JSON file, or '-' for stdin
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// Output file for --organize. Defaults to rewriting the input.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Config JSON file (grid/geometry/layout overrides)
    #[arg(short = 'c', long = "configFile")]
    pub config: Option<PathBuf>,

    /// Report cycles and abnormal elements; exit non-zero on blocking
    /// findings
    #[arg(long = "check")]
    pub check: bool,

    /// Re-arrange all stages and tasks with the hierarchical layout
    #[arg(long = "organize")]
    pub organize: bool,
}

pub fn run() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;
    let mut plan = load_input(&args.input, &config)?;
    info!(
        "loaded plan: {} stages, {} unassigned tasks, {} connections",
        plan.stages.len(),
        plan.unassigned.len(),
        plan.connections.len()
    );

    if !args.check && !args.organize {
        return Err(anyhow::anyhow!("nothing to do: pass --check and/or --organize"));
    }

    let mut blocking = 0usize;
    if args.check {
        let cycles = detect_cycles(&plan);
        for cycle in &cycles {
            println!(
                "cycle [{}]: {}",
                cycle.element_type.as_str(),
                cycle
                    .path
                    .iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(" -> ")
            );
        }
        blocking += cycles.len();

        let findings = audit_plan(&plan);
        for finding in &findings {
            let mark = match finding.severity() {
                Severity::Blocking => "error",
                Severity::Warning => "warning",
            };
            println!(
                "{} [{} {}] {}: {:?}",
                mark,
                finding.element_type.as_str(),
                finding.element_id,
                finding.name,
                finding.reasons
            );
            if finding.severity() == Severity::Blocking {
                blocking += 1;
            }
        }
        if cycles.is_empty() && findings.is_empty() {
            println!("plan is clean");
        }
    }

    if args.organize {
        let result = layout::organize(&plan, &config);
        layout::apply(&mut plan, &result, &config);
        let target = match args.output.as_deref() {
            Some(path) => path,
            None if args.input != Path::new("-") => &args.input,
            None => {
                return Err(anyhow::anyhow!("--organize over stdin requires --output"));
            }
        };
        write_plan(target, &plan)?;
        info!("organized plan written to {}", target.display());
    }

    if blocking > 0 {
        return Err(anyhow::anyhow!("{blocking} blocking problem(s) found"));
    }
    Ok(())
}

fn load_input(path: &Path, config: &Config) -> Result<Plan> {
    if path == Path::new("-") {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        let stored: StoredPlan = serde_json::from_str(&buf)?;
        return Ok(from_stored(&stored, config)?);
    }
    read_plan(path, config)
}
