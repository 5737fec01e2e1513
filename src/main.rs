use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};

use pkzip_rs::{
    ArchiveStatus, CompressionLevel, PasswordProvider, ZipReader, ZipResult, ZipWriter,
};

#[derive(Parser)]
#[command(name = "pkzip", about = "PKZIP 2.0 archiver", version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// More log output (repeat for debug)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress progress messages
    #[arg(short = 'q', long = "quiet", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an archive from files and directories
    Create {
        /// Archive file to write
        archive: PathBuf,

        /// Files or directories to add
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Encrypt entries with this password
        #[arg(long = "pwd", value_name = "PASSWORD")]
        password: Option<String>,

        /// store, 1-9, cpu, mime or full
        #[arg(short = 'l', long = "level", default_value = "full")]
        level: CompressionLevel,

        /// Archive comment
        #[arg(short = 'c', long = "comment")]
        comment: Option<String>,
    },
    /// List contents of archive
    List { archive: PathBuf },
    /// Extract files (all if none given)
    Extract {
        archive: PathBuf,

        files: Vec<String>,

        /// Set output directory
        #[arg(short = 'd', value_name = "DIR", default_value = ".")]
        dest_dir: PathBuf,

        /// Set password
        #[arg(long = "pwd", value_name = "PASSWORD")]
        password: Option<String>,
    },
    /// Verify every entry without writing files
    Test {
        archive: PathBuf,

        #[arg(long = "pwd", value_name = "PASSWORD")]
        password: Option<String>,
    },
}

struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            eprintln!("{}: {}", record.level().as_str().to_lowercase(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => log::LevelFilter::Error,
        (false, 0) => log::LevelFilter::Warn,
        (false, 1) => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

/// Asks on the terminal; an empty answer gives up.
struct PromptPassword;

impl PasswordProvider for PromptPassword {
    fn password(&mut self, entry: &str) -> Option<String> {
        eprint!("\nEnter Password for {entry} (empty to skip) : ");
        std::io::stderr().flush().ok();
        let mut pwd = String::new();
        std::io::stdin().lock().read_line(&mut pwd).ok()?;
        let pwd = pwd.trim_end_matches(['\r', '\n']).to_string();
        (!pwd.is_empty()).then_some(pwd)
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Command::Create {
            archive,
            paths,
            password,
            level,
            comment,
        } => create(&archive, &paths, password.as_deref(), level, comment.as_deref(), cli.quiet),
        Command::List { archive } => list(&archive),
        Command::Extract {
            archive,
            files,
            dest_dir,
            password,
        } => extract(&archive, &files, &dest_dir, password.as_deref(), cli.quiet),
        Command::Test { archive, password } => test(&archive, password.as_deref(), cli.quiet),
    };

    if let Err(e) = result {
        eprintln!("err: {e}");
        process::exit(1);
    }
}

fn create(
    archive: &Path,
    paths: &[PathBuf],
    password: Option<&str>,
    level: CompressionLevel,
    comment: Option<&str>,
    quiet: bool,
) -> ZipResult<()> {
    let mut writer = ZipWriter::create(archive)?;
    if let Some(pwd) = password {
        writer.set_password(pwd);
    }
    if let Some(c) = comment {
        writer.set_comment(c);
    }

    let result = add_all(&mut writer, paths, level, quiet).and_then(|()| writer.close());
    if result.is_err() {
        drop(writer);
        let _ = std::fs::remove_file(archive);
    }
    result
}

fn add_all(
    writer: &mut ZipWriter<std::fs::File>,
    paths: &[PathBuf],
    level: CompressionLevel,
    quiet: bool,
) -> ZipResult<()> {
    for path in paths {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !quiet {
            eprintln!("adding : {}", path.display());
        }
        writer.add_path(path, &name, level)?;
    }
    Ok(())
}

fn open(archive: &Path, password: Option<&str>) -> ZipResult<ZipReader<std::fs::File>> {
    let mut reader = ZipReader::open(archive)?;
    if let ArchiveStatus::PartiallyCorrupted { parsed, declared } = reader.status() {
        eprintln!("warning: archive partially corrupted, {parsed} of {declared} entries readable");
    }
    if let Some(pwd) = password {
        reader.set_password(pwd);
    }
    reader.set_password_provider(Box::new(PromptPassword));
    Ok(reader)
}

fn list(archive: &Path) -> ZipResult<()> {
    let reader = ZipReader::open(archive)?;

    println!("\nListing archive: {}", archive.display());
    println!();
    println!("Attr  Uncomp Size    Comp Size Method  Date & Time & File Name");
    println!(
        "---- ------------ ------------ ------- ------------------------------------------------"
    );

    let mut total_uncompressed: u64 = 0;
    let mut total_compressed: u64 = 0;
    let mut file_count: u32 = 0;

    for entry in reader.entries() {
        let attr = if entry.is_directory { "_D__" } else { "A___" };
        let encrypted = if entry.is_encrypted { "*" } else { "" };

        println!(
            "{attr} {:>12} {:>12} {:<7} {}  {}{encrypted}",
            entry.uncompressed_size,
            entry.compressed_size,
            entry.compression_method,
            entry.modified,
            entry.name,
        );

        file_count += 1;
        total_uncompressed += entry.uncompressed_size as u64;
        total_compressed += entry.compressed_size as u64;
    }

    println!(
        "---- ------------ ------------ ------- ------------------------------------------------"
    );
    let plural = if file_count <= 1 { "" } else { "s" };
    println!(
        "     {total_uncompressed:>12} {total_compressed:>12}         Total {file_count} file{plural}"
    );
    if !reader.comment().is_empty() {
        println!("\n{}", reader.comment());
    }
    if reader.skipped_entries() > 0 {
        println!("({} unsupported entries hidden)", reader.skipped_entries());
    }
    Ok(())
}

fn extract(
    archive: &Path,
    files: &[String],
    dest_dir: &Path,
    password: Option<&str>,
    quiet: bool,
) -> ZipResult<()> {
    let mut reader = open(archive, password)?;

    if !quiet {
        eprintln!("\nExtract {} to {}", archive.display(), dest_dir.display());
    }

    if files.is_empty() {
        let summary = reader.extract_all(dest_dir)?;
        if !quiet {
            eprintln!("\n{} extracted.", summary.extracted);
        }
        if !summary.is_clean() {
            eprintln!(
                "{} corrupted, {} wrong password, {} skipped, {} failed",
                summary.corrupted, summary.wrong_password, summary.skipped_encrypted, summary.failed
            );
            process::exit(2);
        }
        return Ok(());
    }

    for name in files {
        if !reader.contains(name) {
            eprintln!("\nfilename not matched : {name}");
            continue;
        }
        if !quiet {
            eprint!("\nextracting : {name} ");
        }
        reader.extract(name, dest_dir)?;
        if !quiet {
            eprint!(".. ok");
        }
    }
    if !quiet {
        eprintln!("\ndone.");
    }
    Ok(())
}

fn test(archive: &Path, password: Option<&str>, quiet: bool) -> ZipResult<()> {
    let mut reader = open(archive, password)?;
    let summary = reader.test_all()?;
    if !quiet {
        eprintln!("{} entries ok", summary.extracted);
    }
    if !summary.is_clean() {
        eprintln!(
            "{} corrupted, {} wrong password, {} skipped, {} failed",
            summary.corrupted, summary.wrong_password, summary.skipped_encrypted, summary.failed
        );
        process::exit(2);
    }
    Ok(())
}
