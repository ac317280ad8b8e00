//! Demo driver for the hybrid memory manager: assembles one
//! `HybridMemoryManager` from hardcoded defaults (overridable by a handful
//! of `--flag=value` arguments), replays a synthetic round-robin access
//! trace against it, lets the engine run to completion, and prints the
//! outbound statistics.

mod logger;
mod workload;

use std::error::Error;
use std::process::ExitCode;

use hmm_addresses::Pid;
use hmm_manager::testing::{FixedLatencyDevice, FixedLatencyLlc};
use hmm_manager::{
    AccessCountPolicy, FlushPolicy, HybridMemoryManager, InMemoryStats, ManagerConfig, ManagerError, PeriodType,
};

use crate::logger::StderrLogger;
use crate::workload::RoundRobinGenerator;

struct Args {
    page_size: u64,
    block_size: u64,
    dram_pages: u64,
    pcm_pages: u64,
    max_flush_queue_size: usize,
    demote_timeout: u64,
    partition_period: u64,
    max_migration_table_size: usize,
    num_pids: u32,
    footprint: usize,
    ticks: u64,
    log_level: log::LevelFilter,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            page_size: 4096,
            block_size: 64,
            dram_pages: 4,
            pcm_pages: 16,
            max_flush_queue_size: 8,
            demote_timeout: 1000,
            partition_period: 500,
            max_migration_table_size: 8,
            num_pids: 2,
            footprint: 6,
            ticks: 20_000,
            log_level: log::LevelFilter::Info,
        }
    }
}

impl Args {
    /// Parse `--flag=value` pairs by hand, matching `tools/packer`'s plain
    /// `env::args()` loop — no `clap`, no config file.
    fn parse() -> Self {
        let mut args = Self::default();
        for raw in std::env::args().skip(1) {
            let Some((flag, value)) = raw.strip_prefix("--").and_then(|s| s.split_once('=')) else {
                eprintln!("ignoring unrecognized argument {raw:?}");
                continue;
            };
            match flag {
                "page-size" => args.page_size = parse_or_warn(flag, value, args.page_size),
                "block-size" => args.block_size = parse_or_warn(flag, value, args.block_size),
                "dram-pages" => args.dram_pages = parse_or_warn(flag, value, args.dram_pages),
                "pcm-pages" => args.pcm_pages = parse_or_warn(flag, value, args.pcm_pages),
                "demote-timeout" => args.demote_timeout = parse_or_warn(flag, value, args.demote_timeout),
                "partition-period" => args.partition_period = parse_or_warn(flag, value, args.partition_period),
                "num-pids" => args.num_pids = parse_or_warn(flag, value, args.num_pids),
                "footprint" => args.footprint = parse_or_warn(flag, value, args.footprint),
                "ticks" => args.ticks = parse_or_warn(flag, value, args.ticks),
                "log-level" => args.log_level = value.parse().unwrap_or(args.log_level),
                _ => eprintln!("ignoring unrecognized flag --{flag}"),
            }
        }
        args
    }
}

fn parse_or_warn<T: std::str::FromStr>(flag: &str, value: &str, default: T) -> T {
    value.parse().unwrap_or_else(|_| {
        eprintln!("ignoring malformed --{flag}={value}");
        default
    })
}

fn main() -> ExitCode {
    let args = Args::parse();
    StderrLogger::new(args.log_level).init();

    if let Err(err) = run(&args) {
        log::error!("{err}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn run(args: &Args) -> Result<(), Box<dyn Error>> {
    let config = ManagerConfig::new(
        args.page_size,
        args.block_size,
        args.dram_pages * args.page_size,
        args.pcm_pages * args.page_size,
        FlushPolicy::FlushPcmBefore,
        args.max_flush_queue_size,
        false,
        args.demote_timeout,
        args.partition_period,
        PeriodType::Cycles,
        args.max_migration_table_size,
    )?;

    let mut mgr = HybridMemoryManager::new(
        config,
        FixedLatencyLlc::default(),
        FixedLatencyDevice::default(),
        InMemoryStats::new(),
    );
    mgr.add_policy(Box::new(AccessCountPolicy::new()));

    for pid in 0..args.num_pids {
        match mgr.allocate(Pid::new(pid), args.footprint) {
            Ok(()) => {}
            Err(ManagerError::OutOfCapacity) => {
                log::warn!("pid {pid} could not be fully allocated, DRAM+PCM exhausted");
                break;
            }
            Err(err) => return Err(Box::new(err)),
        }
    }
    mgr.start();

    let mut generator = RoundRobinGenerator::new(args.num_pids, args.footprint, args.page_size);
    let mut stalled = 0u64;
    let mut issued = 0u64;
    for _ in 0..args.ticks {
        let (pid, vaddr, cpu) = generator.next_access();
        match mgr.access(pid, vaddr, true, false, cpu) {
            Ok((stall, _paddr)) => {
                issued += 1;
                if stall {
                    stalled += 1;
                }
            }
            Err(ManagerError::OutOfCapacity) => {
                log::trace!("access denied for {pid:?}, capacity exhausted");
            }
            Err(err) => return Err(Box::new(err)),
        }
        mgr.step();
    }

    // Drain whatever migrations are still in flight now that the access
    // trace has ended.
    mgr.run_while_pending(10_000);

    print_summary(&mgr, issued, stalled);
    Ok(())
}

fn print_summary(mgr: &HybridMemoryManager<FixedLatencyLlc, FixedLatencyDevice, InMemoryStats>, issued: u64, stalled: u64) {
    let stats = mgr.stats();
    println!("=== hmm-cli summary ===");
    println!("simulated time:           {}", mgr.now());
    println!("accesses issued/stalled:  {issued}/{stalled}");
    println!("dram full migrations:     {}", stats.dram_full_migrations);
    println!("pcm full migrations:      {}", stats.pcm_full_migrations);
    println!("dram partial (rollback):  {}", stats.dram_partial_migrations);
    println!("pcm partial (rollback):   {}", stats.pcm_partial_migrations);
    println!("dirty/clean flushed blocks: {}/{}", stats.dirty_flushed_blocks, stats.clean_flushed_blocks);
    println!("tag changes:              {}", stats.tag_changes);
    println!("avg migration table len:  {:.2}", stats.average_migration_table_occupancy());
}
