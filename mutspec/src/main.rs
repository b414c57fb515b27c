#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, WrapErr};
use mutspec_ast::{Program, format_expr};
use mutspec_core::{
    Mode, ObligationBuilder, Site, Stage, build_call_graph, enumerate_atoms, enumerate_paths, mutate,
    parse_remove_directives,
};
use mutspec_verify::{Pipeline, Scheduler, apply_removals};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod report;

use config::{MutspecConfig, WorkerEntry, parse_worker_list};

#[derive(Parser, Debug)]
#[command(
    name = "mutspec",
    version,
    about = "Search for specification repairs by mutating a predicate and checking it with a verifier"
)]
struct Cli {
    /// Log at debug level (overrides RUST_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Configuration file. Defaults to ./mutspec.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Cmd,
}

/// Program and target shared by every subcommand.
#[derive(clap::Args, Debug)]
struct Input {
    /// Resolved program as JSON
    program: PathBuf,

    /// Predicate, function, lemma or method under search
    #[arg(long)]
    target: String,

    /// `body`, or a contract clause as `requires:N` / `ensures:N`
    #[arg(long)]
    site: Option<Site>,

    /// Conjuncts to drop before searching (`file:line[,file:line...]`)
    #[arg(long)]
    remove: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Run the three-pass search against the configured workers
    Run {
        #[command(flatten)]
        input: Input,

        /// HTTP workers, `host:port[,host:port...]`
        #[arg(long)]
        workers: Option<String>,

        /// Run a local verifier binary instead of remote workers
        #[arg(long, conflicts_with = "workers")]
        verifier: Option<PathBuf>,

        /// Maximum conjunction depth
        #[arg(long)]
        depth: Option<usize>,

        /// `mutate` or `conjoin`
        #[arg(long)]
        mode: Option<Mode>,

        /// Lemma re-verified in the last pass
        #[arg(long)]
        proof: Option<String>,

        /// Predicate conjoined to the validity check's preconditions
        #[arg(long)]
        constraint: Option<String>,

        /// Entry point of the call path the validity check follows
        #[arg(long)]
        root: Option<String>,

        #[arg(long)]
        workdir: Option<PathBuf>,

        /// Write one transcript per verification job
        #[arg(long)]
        aux_files: bool,
    },

    /// Print the mutate-mode candidates for the target
    Mutations {
        #[command(flatten)]
        input: Input,
    },

    /// Print the conjoin-mode candidates and their negation pairs
    Atoms {
        #[command(flatten)]
        input: Input,

        #[arg(long)]
        max_expr_depth: Option<usize>,
    },

    /// Print the call paths from `root` to the target
    Paths {
        #[command(flatten)]
        input: Input,

        #[arg(long)]
        root: String,
    },

    /// Print every obligation rendered for the unchanged target
    Lemmas {
        #[command(flatten)]
        input: Input,

        #[arg(long)]
        proof: Option<String>,

        #[arg(long)]
        root: Option<String>,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn read_program(path: &Path) -> miette::Result<Program> {
    let text = std::fs::read_to_string(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text)
        .into_diagnostic()
        .wrap_err_with(|| format!("parsing {}", path.display()))
}

/// Reads the program and applies `--remove` up front.
fn load_program(input: &Input) -> miette::Result<Program> {
    let mut program = read_program(&input.program)?;
    if let Some(remove) = &input.remove {
        let directives = parse_remove_directives(remove)?;
        apply_removals(&mut program, &input.target, &directives)?;
    }
    Ok(program)
}

fn file_name_of(program: &Program) -> String {
    Path::new(&program.file)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("input.dfy")
        .to_string()
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let mut cfg = MutspecConfig::load(cli.config.as_deref())?;

    match cli.cmd {
        Cmd::Run {
            input,
            workers,
            verifier,
            depth,
            mode,
            proof,
            constraint,
            root,
            workdir,
            aux_files,
        } => {
            if let Some(list) = workers {
                cfg.workers = parse_worker_list(&list);
            }
            if let Some(bin) = verifier {
                cfg.workers = vec![WorkerEntry::process(bin)];
            }
            if let Some(d) = depth {
                cfg.search.max_search_depth = d;
            }
            if let Some(m) = mode {
                cfg.search.mode = m;
            }
            if let Some(site) = input.site {
                cfg.search.site = site;
            }
            if let Some(dir) = workdir {
                cfg.output.workdir = dir;
            }
            cfg.output.aux_files |= aux_files;

            let mut pipeline_cfg = cfg.pipeline_config();
            pipeline_cfg.proof = proof;
            pipeline_cfg.constraint = constraint;
            pipeline_cfg.root = root;
            if let Some(remove) = &input.remove {
                pipeline_cfg.remove = parse_remove_directives(remove)?;
            }

            // Removal directives are applied by the pipeline itself.
            let program = read_program(&input.program)?;

            let workers = cfg.build_workers(&file_name_of(&program))?;
            let mut scheduler = Scheduler::new(workers, cfg.scheduler_config())?;
            let mut pipeline = Pipeline::new(program, &input.target, &pipeline_cfg)?;
            info!(
                workers = scheduler.worker_count(),
                candidates = pipeline.state().len(),
                "starting search"
            );

            let summary = pipeline.run(&mut scheduler).await;

            if summary.already_verifies {
                println!("The proof already goes through; no mutation needed.");
            } else {
                print!("{}", report::outcome_table(&summary.counts()));
                if summary.repairs.is_empty() {
                    println!("No repair found.");
                }
                for &i in &summary.repairs {
                    println!("repair #{i}: {}", summary.candidates[i].expr);
                }
            }

            let dir = &cfg.output.workdir;
            std::fs::create_dir_all(dir).into_diagnostic()?;
            report::write_time_summaries(dir, &summary.timings)?;
            report::write_report(dir, &report::RunReport::new(&input.program, summary))?;
            Ok(())
        }

        Cmd::Mutations { input } => {
            let program = load_program(&input)?;
            let site = input.site.unwrap_or(cfg.search.site);
            let builder = ObligationBuilder::at(program, &input.target, site, Mode::Mutate)?;
            let seed = builder.seed();
            println!("0: {}", format_expr(seed));
            for (i, c) in mutate(seed).iter().enumerate() {
                println!("{}: {}", i + 1, c.text());
            }
            Ok(())
        }

        Cmd::Atoms {
            input,
            max_expr_depth,
        } => {
            let program = load_program(&input)?;
            let site = input.site.unwrap_or(cfg.search.site);
            let builder = ObligationBuilder::at(program, &input.target, site, Mode::Conjoin)?;
            let depth = max_expr_depth.unwrap_or(cfg.search.max_expr_depth);
            let atoms = enumerate_atoms(builder.program(), builder.target(), depth);
            for (i, c) in atoms.candidates.iter().enumerate() {
                println!("{i}: {}", c.text());
            }
            for (a, b) in &atoms.negations {
                println!("negation: {a} <-> {b}");
            }
            Ok(())
        }

        Cmd::Paths { input, root } => {
            let program = load_program(&input)?;
            let graph = build_call_graph(&program, &root)?;
            for edge in graph.edges() {
                let cond = edge.cond.as_ref().map(format_expr);
                println!(
                    "{} -> {} [{}] when {}",
                    edge.caller,
                    edge.callee,
                    format_expr(&edge.call),
                    cond.as_deref().unwrap_or("true")
                );
            }
            for (i, path) in enumerate_paths(&graph, &root, &input.target).iter().enumerate() {
                let decls: Vec<&str> = path.iter().map(|s| s.decl.as_str()).collect();
                println!("path {i}: {}", decls.join(" -> "));
            }
            Ok(())
        }

        Cmd::Lemmas { input, proof, root } => {
            let program = load_program(&input)?;
            let root = root.unwrap_or_else(|| input.target.clone());
            let graph = build_call_graph(&program, &root)?;
            let path = enumerate_paths(&graph, &root, &input.target)
                .into_iter()
                .next()
                .unwrap_or_default();
            let site = input.site.unwrap_or(cfg.search.site);
            let builder = ObligationBuilder::at(program, &input.target, site, cfg.search.mode)?
                .with_time_limit_multiplier(cfg.verifier.time_limit_multiplier)
                .with_verifier_args(cfg.verifier.args.clone())
                .with_proof(proof)
                .with_path(path);
            for stage in Stage::ALL {
                match builder.stage_lemma(stage) {
                    Some(l) => println!("// {stage}\n{}\n", l.text),
                    None => println!("// {stage}: re-verifies the configured proof\n"),
                }
            }
            println!("{}\n", builder.same_lemma().text);
            println!("{}", builder.stronger_lemma().text);
            Ok(())
        }
    }
}
