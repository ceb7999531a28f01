use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use kdam::{BarExt, tqdm};
use paperwork_index::{
    ConfigDb,
    DataDir,
    DocHandle,
    DocSearch,
    Error,
    FsProvider,
    IndexStore,
    Label,
    Progress,
    Result,
    config_db::keys,
    progress,
};
use serde::Serialize;
use tracing::warn;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Command, ConfigAction, LabelAction};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("PAPERWORK_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let config_db = ConfigDb::open(&data_dir.config_db())?;

    match &cli.command {
        Command::Config { action } => cmd_config(&config_db, action)?,
        Command::Sync => {
            let search = open_search(&cli, &config_db, &data_dir)?;
            println!(
                "{} documents known, {} indexed",
                search.document_count(),
                search.store().num_docs()
            );
        }
        Command::Search(args) => {
            let search = open_search(&cli, &config_db, &data_dir)?;
            let docs = search.find(&args.query_text())?;
            print_documents(&docs, args.json)?;
        }
        Command::Suggest(args) => {
            let search = open_search(&cli, &config_db, &data_dir)?;
            let suggestions = search.suggest(&args.query_text())?;
            if args.json {
                println!("{}", to_json(&suggestions)?);
            } else if suggestions.is_empty() {
                println!("No suggestions.");
            } else {
                for s in &suggestions {
                    println!("{s}");
                }
            }
        }
        Command::RedoOcr(args) => {
            cmd_redo_ocr(&cli, &config_db, &data_dir, args)?;
        }
        Command::Label { action } => {
            let search = open_search(&cli, &config_db, &data_dir)?;
            cmd_label(&cli, &search, action)?;
        }
        Command::Status(args) => {
            cmd_status(&cli, &config_db, &data_dir, args.json)?;
        }
        Command::Completions(_) => unreachable!("handled above"),
    }

    Ok(())
}

fn workdir(cli: &Cli, config_db: &ConfigDb) -> Result<PathBuf> {
    let dir = match &cli.workdir {
        Some(dir) => dir.clone(),
        None => config_db.workdir()?,
    };
    if !dir.is_dir() {
        return Err(Error::Config(format!(
            "document directory does not exist: {}",
            dir.display()
        )));
    }
    Ok(dir)
}

fn open_search(
    cli: &Cli,
    config_db: &ConfigDb,
    data_dir: &DataDir,
) -> Result<DocSearch> {
    let provider = Arc::new(FsProvider::new(workdir(cli, config_db)?));
    let index_dir = data_dir.index_dir()?;
    with_progress(cli.quiet, "indexing", |progress| {
        DocSearch::open(provider, &index_dir, progress)
    })
}

/// Run `op` with a progress bar on stderr, unless `quiet`.
fn with_progress<T>(
    quiet: bool,
    desc: &str,
    op: impl FnOnce(&mut dyn FnMut(&Progress)) -> Result<T>,
) -> Result<T> {
    if quiet {
        return op(&mut progress::ignore);
    }

    let mut bar = tqdm!(desc = desc.to_string(), total = 0, leave = false);
    let result = op(&mut |p: &Progress| {
        bar.total = p.total;
        bar.set_description(format!("{desc} ({})", p.phase));
        // Display only: a failed redraw must not abort the operation.
        let _ = bar.update_to(p.done);
    });
    let _ = bar.clear();
    result
}

fn cmd_redo_ocr(
    cli: &Cli,
    config_db: &ConfigDb,
    data_dir: &DataDir,
    args: &cli::RedoOcrArgs,
) -> Result<()> {
    let language = match &args.lang {
        Some(lang) => lang.clone(),
        None => config_db.ocr_lang()?,
    };
    let workers = match args.workers {
        Some(n) => n,
        None => config_db.ocr_workers()?,
    };

    let search = open_search(cli, config_db, data_dir)?;
    let report = with_progress(cli.quiet, "OCR", |progress| {
        search.redo_ocr(&language, workers, progress)
    })?;
    for (docid, reason) in &report.failed {
        warn!(docid = %docid, "OCR failed: {reason}");
    }

    with_progress(cli.quiet, "reindexing", |progress| {
        search.synchronize(progress)
    })?;

    println!(
        "OCR redone on {} of {} documents ({} failed)",
        report.succeeded(),
        report.listed,
        report.failed.len()
    );
    Ok(())
}

fn cmd_label(cli: &Cli, search: &DocSearch, action: &LabelAction) -> Result<()> {
    match action {
        LabelAction::List { json } => {
            let labels = search.label_list();
            if *json {
                let rows: Vec<LabelRow> = labels.iter().map(LabelRow::from).collect();
                println!("{}", to_json(&rows)?);
            } else if labels.is_empty() {
                println!("No labels.");
            } else {
                for label in &labels {
                    match &label.color {
                        Some(color) => println!("{}\t{color}", label.name),
                        None => println!("{}", label.name),
                    }
                }
            }
        }
        LabelAction::Add { docid, name, color } => {
            let doc = search.document(docid).ok_or_else(|| Error::NotFound {
                kind: "document",
                name: docid.clone(),
            })?;
            search.add_label(&doc, &make_label(name, color.as_deref()))?;
            println!("Added label '{name}' to {docid}");
        }
        LabelAction::Rename { old, new, color } => {
            let changed = with_progress(cli.quiet, "relabeling", |progress| {
                search.update_label(old, &make_label(new, color.as_deref()), progress)
            })?;
            println!("Renamed '{old}' to '{new}' on {changed} document(s)");
        }
        LabelAction::Remove { name } => {
            let changed = with_progress(cli.quiet, "relabeling", |progress| {
                search.destroy_label(name, progress)
            })?;
            println!("Removed '{name}' from {changed} document(s)");
        }
    }
    Ok(())
}

fn make_label(name: &str, color: Option<&str>) -> Label {
    match color {
        Some(color) => Label::new(name).with_color(color),
        None => Label::new(name),
    }
}

fn cmd_config(config_db: &ConfigDb, action: &ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Get { key } => match config_db.get_setting(key)? {
            Some(value) => println!("{value}"),
            None => {
                return Err(Error::NotFound {
                    kind: "setting",
                    name: key.clone(),
                });
            }
        },
        ConfigAction::Set { key, value } => {
            let value = if key == keys::WORKDIR {
                std::path::Path::new(value)
                    .canonicalize()
                    .map_err(|e| {
                        Error::Config(format!("cannot resolve path {value}: {e}"))
                    })?
                    .to_string_lossy()
                    .to_string()
            } else {
                value.clone()
            };
            config_db.set_setting(key, &value)?;
            println!("{key} = {value}");
        }
        ConfigAction::Unset { key } => {
            if !config_db.remove_setting(key)? {
                return Err(Error::NotFound {
                    kind: "setting",
                    name: key.clone(),
                });
            }
            println!("Removed {key}");
        }
        ConfigAction::List => {
            for (key, value) in config_db.list_settings()? {
                println!("{key}\t{value}");
            }
        }
    }
    Ok(())
}

fn cmd_status(
    cli: &Cli,
    config_db: &ConfigDb,
    data_dir: &DataDir,
    json: bool,
) -> Result<()> {
    let index_dir = data_dir.index_dir()?;
    let (indexed_documents, index_error) =
        match IndexStore::open_existing(&index_dir) {
            Ok(Some(store)) => (store.num_docs(), None),
            Ok(None) => (0, None),
            Err(e) => {
                warn!(error = %e, "index is unreadable; `sync` will rebuild it");
                (0, Some(e.to_string()))
            }
        };
    let workdir = cli
        .workdir
        .clone()
        .or_else(|| config_db.workdir().ok());
    let status = Status {
        data_dir: data_dir.root().display().to_string(),
        index_dir: index_dir.display().to_string(),
        workdir: workdir.map(|w| w.display().to_string()),
        ocr_lang: config_db.ocr_lang()?,
        ocr_workers: config_db.ocr_workers()?,
        indexed_documents,
        index_error,
    };

    if json {
        println!("{}", to_json(&status)?);
    } else {
        println!("Data directory: {}", status.data_dir);
        println!("Index: {}", status.index_dir);
        println!(
            "Documents: {}",
            status.workdir.as_deref().unwrap_or("(not configured)")
        );
        println!("OCR language: {}", status.ocr_lang);
        println!("OCR workers: {}", status.ocr_workers);
        println!("Indexed documents: {}", status.indexed_documents);
        if let Some(error) = &status.index_error {
            println!("Index problem: {error}");
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct Status {
    data_dir: String,
    index_dir: String,
    workdir: Option<String>,
    ocr_lang: String,
    ocr_workers: usize,
    indexed_documents: u64,
    index_error: Option<String>,
}

#[derive(Serialize)]
struct DocumentRow {
    docid: String,
    kind: &'static str,
    labels: Vec<String>,
    last_modified: u64,
}

#[derive(Serialize)]
struct LabelRow {
    name: String,
    color: Option<String>,
}

impl From<&Label> for LabelRow {
    fn from(label: &Label) -> Self {
        Self {
            name: label.name.clone(),
            color: label.color.clone(),
        }
    }
}

fn print_documents(docs: &[DocHandle], json: bool) -> Result<()> {
    if json {
        let mut rows = Vec::with_capacity(docs.len());
        for doc in docs {
            rows.push(DocumentRow {
                docid: doc.id().to_string(),
                kind: doc.kind().as_str(),
                labels: doc.labels()?.into_iter().map(|l| l.name).collect(),
                last_modified: doc.last_modified()?,
            });
        }
        println!("{}", to_json(&rows)?);
    } else if docs.is_empty() {
        println!("No documents found.");
    } else {
        for doc in docs {
            println!("{}", doc.id());
        }
        println!("\n{} document(s)", docs.len());
    }
    Ok(())
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| Error::Config(format!("cannot encode JSON: {e}")))
}
