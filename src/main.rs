use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;

use ropkit::config::{ExploitConfig, Location};
use ropkit::elf::LibraryImage;
use ropkit::hexdump;
use ropkit::inspect::{self, CheckStatus};
use ropkit::pattern;
use ropkit::payload::write_file;
use ropkit::profiles::{Profile, ProfileOptions, DEFAULT_CALLS};
use ropkit::rop_chain::RopChain;
use ropkit::types::Width;

#[derive(Parser)]
#[command(name = "ropkit", about = "ROP payload builder for stack buffer overflows")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build a profile's payload and write it to a file
    Build(BuildArgs),
    /// Check a profile's libc offsets against a library on disk
    Inspect {
        #[arg(value_enum)]
        profile: ProfileArg,
        /// Library the base-relative offsets refer to
        #[arg(long)]
        lib: PathBuf,
        /// Override the base address
        #[arg(long, value_parser = parse_address)]
        base: Option<u64>,
    },
    /// Cyclic pattern for finding the return-address offset
    Pattern {
        #[command(subcommand)]
        action: PatternCmd,
    },
    /// Write a counter fill (1, 2, ..., 254, 255, 1, ...) to a file
    Counter {
        #[arg(short = 'n', long, default_value_t = pattern::COUNTER_DEFAULT_LEN)]
        len: usize,
        #[arg(short, long, default_value = "badfile")]
        output: PathBuf,
    },
    /// Map a file or block device read-only and hex-dump its first bytes
    Dump {
        path: PathBuf,
        #[arg(short = 'n', long, default_value_t = 512)]
        count: usize,
        /// Bytes to map (default: size of the file or device)
        #[arg(long)]
        map_len: Option<usize>,
    },
}

#[derive(Args)]
struct BuildArgs {
    #[arg(value_enum)]
    profile: ProfileArg,
    /// Output file fed to the vulnerable program
    #[arg(short, long, default_value = "badfile")]
    output: PathBuf,
    /// Override the base address of base-relative entries
    #[arg(long, value_parser = parse_address)]
    base: Option<u64>,
    /// Override the buffer offset
    #[arg(long)]
    offset: Option<usize>,
    /// Number of printf frames (printf32)
    #[arg(long, default_value_t = DEFAULT_CALLS)]
    calls: usize,
    /// Zero this many bytes of the stack target with sprintf first (ret2libc64)
    #[arg(long, default_value_t = 0)]
    zero_bytes: usize,
    /// Insert a ret before system() for stack alignment (ret2libc64)
    #[arg(long)]
    align: bool,
    /// Print a hex dump of the payload
    #[arg(long)]
    hexdump: bool,
    /// Only print errors
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Subcommand)]
enum PatternCmd {
    /// Print (or write) a cyclic pattern
    Create {
        len: usize,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Locate a crashed register value in the cyclic and counter fills
    Offset {
        #[arg(value_parser = parse_address)]
        value: u64,
        /// Register width in bytes (4 or 8)
        #[arg(long, default_value_t = 4)]
        width: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ProfileArg {
    #[value(name = "ret2libc64")]
    Ret2Libc64,
    #[value(name = "printf32")]
    Printf32,
}

impl From<ProfileArg> for Profile {
    fn from(arg: ProfileArg) -> Self {
        match arg {
            ProfileArg::Ret2Libc64 => Profile::Ret2Libc64,
            ProfileArg::Printf32 => Profile::Printf32,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Build(args) => cmd_build(&args),
        Command::Inspect { profile, lib, base } => cmd_inspect(profile.into(), &lib, base),
        Command::Pattern { action } => cmd_pattern(action),
        Command::Counter { len, output } => cmd_counter(len, &output),
        Command::Dump {
            path,
            count,
            map_len,
        } => cmd_dump(&path, count, map_len),
    }
}

fn cmd_build(args: &BuildArgs) -> anyhow::Result<()> {
    let profile: Profile = args.profile.into();
    let config = profile.config_with(args.base, args.offset);
    let opts = ProfileOptions {
        calls: args.calls,
        zero_bytes: args.zero_bytes,
        align: args.align,
    };
    let chain = profile.build(&config, &opts)?;

    if !args.quiet {
        println!(
            "{} profile {} ({})",
            "ropkit".bold().cyan(),
            profile.to_string().bold(),
            config.width
        );
        print_addresses(&config)?;
        print_layout(&chain, config.width);
    }
    if args.hexdump {
        println!("{}", "payload:".bold());
        for line in hexdump::hexdump_lines(0, chain.bytes()) {
            println!("  {}", line);
        }
    }

    write_file(chain.bytes(), &args.output)?;
    if !args.quiet {
        println!(
            "{} wrote {} bytes to {}",
            "ropkit".bold().cyan(),
            chain.size(),
            args.output.display()
        );
    }
    Ok(())
}

fn print_addresses(config: &ExploitConfig) -> anyhow::Result<()> {
    println!("{}", "addresses:".bold());
    println!("  {:<10} {}", "base", config.width.format_addr(config.base_address).cyan());
    for entry in config.entries()? {
        let origin = match entry.location {
            Location::Base(off) => format!("base + 0x{:x}", off),
            Location::Fixed(_) => "fixed".to_string(),
        };
        println!(
            "  {:<10} {:<14} {}  ({})",
            entry.kind.to_string(),
            entry.name,
            config.width.format_addr(entry.address).cyan(),
            origin.dimmed()
        );
    }
    Ok(())
}

/// Left-align `text` in `width` columns. Pad before styling: escape codes
/// would otherwise count toward the width.
fn cell(text: impl std::fmt::Display, width: usize) -> String {
    format!("{:<width$}", text, width = width)
}

fn print_layout(chain: &RopChain, width: Width) {
    println!("{}", "layout:".bold());
    for (elem, label) in chain.listing() {
        let value = match elem.value {
            Some(v) => cell(width.format_addr(v), 20).cyan(),
            None => cell(format!("{} bytes", elem.len), 20).dimmed(),
        };
        println!(
            "  +0x{:04x}  {} {:<20} {}",
            elem.offset,
            value,
            elem.description,
            label.yellow()
        );
    }
}

fn cmd_inspect(profile: Profile, lib: &Path, base: Option<u64>) -> anyhow::Result<()> {
    let config = profile.config_with(base, None);
    let image = LibraryImage::load(lib)?;
    println!(
        "{} checking {} against {}",
        "ropkit".bold().cyan(),
        profile.to_string().bold(),
        lib.display()
    );

    let checks = inspect::check_entries(&config, &image)?;
    for check in &checks {
        let offset = match check.offset {
            Some(off) => format!("+0x{:x}", off),
            None => "fixed".to_string(),
        };
        let status = match check.status {
            CheckStatus::Ok => cell("ok", 9).green(),
            CheckStatus::Mismatch => cell("MISMATCH", 9).red(),
            CheckStatus::Skipped => cell("skipped", 9).dimmed(),
        };
        println!(
            "  {:<14} {:<10} {} {}",
            check.name, offset, status, check.detail
        );
    }

    let mismatches = checks.iter().filter(|c| c.is_mismatch()).count();
    if mismatches > 0 {
        anyhow::bail!("{} of {} entries do not match {}", mismatches, checks.len(), lib.display());
    }
    Ok(())
}

fn cmd_pattern(action: PatternCmd) -> anyhow::Result<()> {
    match action {
        PatternCmd::Create { len, output } => {
            let fill = pattern::cyclic(len)?;
            match output {
                Some(path) => {
                    write_file(&fill, &path)?;
                    println!("wrote {} bytes to {}", fill.len(), path.display());
                }
                None => println!("{}", String::from_utf8_lossy(&fill)),
            }
        }
        PatternCmd::Offset { value, width } => {
            let width = Width::from_bytes(width)?;
            match pattern::cyclic_offset(value, width)? {
                Some(offset) => println!(
                    "  cyclic offset: {} (0x{:x})",
                    offset.to_string().bold(),
                    offset
                ),
                None => println!("  {}", "not in cyclic pattern".yellow()),
            }
            let needle = width.encode(value)?;
            match pattern::counter_offset(&needle) {
                Some(offset) => println!(
                    "  counter offset: {} (mod {})",
                    offset.to_string().bold(),
                    pattern::COUNTER_PERIOD
                ),
                None => println!("  {}", "not in counter fill".yellow()),
            }
        }
    }
    Ok(())
}

fn cmd_counter(len: usize, output: &Path) -> anyhow::Result<()> {
    let fill = pattern::counter_fill(len);
    write_file(&fill, output)?;
    println!(
        "{} wrote {} byte counter fill to {}",
        "ropkit".bold().cyan(),
        fill.len(),
        output.display()
    );
    Ok(())
}

fn cmd_dump(path: &Path, count: usize, map_len: Option<usize>) -> anyhow::Result<()> {
    for line in hexdump::dump_head(path, map_len, count)? {
        println!("{}", line);
    }
    Ok(())
}

fn parse_address(s: &str) -> anyhow::Result<u64> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(s, 16).map_err(|e| anyhow::anyhow!("invalid address '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip_ansi(s: &str) -> String {
        let mut out = String::new();
        let mut in_escape = false;
        for c in s.chars() {
            match (in_escape, c) {
                (false, '\x1b') => in_escape = true,
                (false, c) => out.push(c),
                (true, 'm') => in_escape = false,
                (true, _) => {}
            }
        }
        out
    }

    #[test]
    fn styled_cells_keep_their_width() {
        colored::control::set_override(true);
        let styled = cell("0x00007ffff7c45832", 20).cyan().to_string();
        assert!(styled.contains('\x1b'));
        assert_eq!(strip_ansi(&styled), "0x00007ffff7c45832  ");

        let status = cell("ok", 9).green().to_string();
        assert_eq!(strip_ansi(&status).len(), 9);
        colored::control::unset_override();
    }

    #[test]
    fn addresses_parse_with_or_without_prefix() {
        assert_eq!(parse_address("0x7ffff7a00000").unwrap(), 0x7ffff7a00000);
        assert_eq!(parse_address("deadbeef").unwrap(), 0xdeadbeef);
        assert!(parse_address("0xzz").is_err());
    }
}
