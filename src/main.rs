//! tigbuild: greedy unitig and contig construction from read overlaps.
//!
//! Usage: tigbuild -S seqStore -O ovlStore -o prefix --gs genomeSize [OPTIONS]

use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::process;

use tigbuild::best_graph::{BestGraphParams, BestOverlapGraph, CovGapType, LopsidedMode};
use tigbuild::chunk_graph::ChunkGraph;
use tigbuild::error::{AsmError, Result};
use tigbuild::overlap_cache::{CacheParams, OverlapCache};
use tigbuild::phases::{
    break_singleton_tigs, classify_unassembled, find_circular_contigs, mark_repeat_reads,
    merge_orphans, place_unplaced_using_all_overlaps, populate_unitigs, promote_to_singleton,
    set_parent_and_hang, split_discontinuous, write_tigs, RepeatParams, UnassembledParams,
};
use tigbuild::read_info::ReadInfo;
use tigbuild::tig::TigVector;

#[derive(Parser)]
#[command(name = "tigbuild")]
#[command(version)]
#[command(about = "Greedy unitig and contig construction from read overlaps", long_about = None)]
struct Cli {
    /// Path to an existing seq store
    #[arg(short = 'S', value_name = "seqPath")]
    seq_store: PathBuf,

    /// Path to an existing overlap store
    #[arg(short = 'O', value_name = "ovlPath")]
    ovl_store: PathBuf,

    /// Prefix for output files
    #[arg(short = 'o', value_name = "outPrefix")]
    prefix: PathBuf,

    /// Memory limit in gigabytes; 0 for unlimited
    #[arg(short = 'M', long = "memgb", default_value = "0")]
    mem_gb: f64,

    /// Number of compute threads; 0 for all cores
    #[arg(short = 't', long = "threads", default_value = "0")]
    threads: usize,

    /// Genome size in bases
    #[arg(long = "gs", value_name = "genomeSize")]
    genome_size: u64,

    /// Force reads shorter than this to be ignored
    #[arg(long = "mr", default_value = "0")]
    min_read_len: u32,

    /// Ignore overlaps shorter than this
    #[arg(long = "mo", default_value = "500")]
    min_overlap: u32,

    /// Minimum intersection length for contig junctions
    #[arg(long = "mi", default_value = "500")]
    min_intersect: u32,

    /// Maximum placements when resolving junction reads
    #[arg(long = "mp", default_value = "2")]
    max_placements: u32,

    /// Error-rate cutoff for graph edges
    #[arg(long = "eg", default_value = "0.075")]
    erate_graph: f64,

    /// Error-rate cutoff for loading overlaps
    #[arg(long = "eM", default_value = "0.100")]
    erate_max: f64,

    /// Force the final edge error threshold (disabled at 1.0)
    #[arg(long = "ef", default_value = "1.0")]
    erate_forced: f64,

    /// Percentile fallback when the median best-edge error is zero
    #[arg(long = "ep", default_value = "0.9")]
    percentile: f64,

    /// Junction confusion threshold, absolute bases
    #[arg(long = "ca", default_value = "2500")]
    confused_absolute: u32,

    /// Junction confusion threshold, percent of the best overlap
    #[arg(long = "cp", default_value = "15.0")]
    confused_percent: f64,

    /// Error-rate deviations allowed when building the graph
    #[arg(long = "dg", default_value = "6.0")]
    deviation_graph: f64,

    /// Error-rate deviations allowed when merging bubbles
    #[arg(long = "db", default_value = "6.0")]
    deviation_bubble: f64,

    /// Error-rate deviations allowed when breaking repeats
    #[arg(long = "dr", default_value = "3.0")]
    deviation_repeat: f64,

    /// Similarity threshold, graph (reserved)
    #[arg(long = "sg", default_value = "0.0")]
    similarity_graph: f64,

    /// Similarity threshold for bubble merging
    #[arg(long = "sb", default_value = "0.01")]
    similarity_bubble: f64,

    /// Similarity threshold, repeat (reserved)
    #[arg(long = "sr", default_value = "0.01")]
    similarity_repeat: f64,

    /// Depth to search when peeling spur reads
    #[arg(long = "sd", default_value = "3")]
    spur_depth: u32,

    /// Disable a filter: higherror, lopsided, spur, deadends
    #[arg(long = "nofilter", value_name = "FILTER")]
    nofilter: Vec<String>,

    /// Per-overlap length floor as a fraction of the shorter read
    #[arg(long = "minolappercent", default_value = "0.0")]
    min_olap_percent: f64,

    /// Relax the edge error threshold when fewer than this fraction of
    /// reads keep two best edges
    #[arg(long = "minreadsbest", default_value = "0.8")]
    min_reads_best: f64,

    /// Coverage-gap handling: none, chimer, uncovered, deadend
    #[arg(long = "covgaptype", default_value = "uncovered")]
    covgap_type: String,

    /// Required overlap-to-overlap stitch when detecting coverage gaps
    #[arg(long = "covgapolap", default_value = "500")]
    covgap_olap: u32,

    /// Lopsided-read handling: off, or noseed/nobest with a percent
    #[arg(long = "lopsided", num_args = 1..=2, default_values = ["noseed", "25.0"])]
    lopsided: Vec<String>,

    /// Unassembled labeling: fewReads tooShort spanFraction lowcovFraction lowcovDepth
    #[arg(long = "unassembled", num_args = 5, default_values = ["2", "0", "1.0", "0.5", "3"])]
    unassembled: Vec<String>,

    /// Disband repeat tigs into singletons
    #[arg(long = "shatterrepeats")]
    shatter_repeats: bool,

    /// Stop after a phase: edges, chunkgraph
    #[arg(long = "stop", value_name = "PHASE")]
    stop: Option<String>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    //  Validate the flag surface before opening anything.

    if cli.genome_size == 0 {
        return Err(AsmError::Config("genome size (--gs) must be supplied and non-zero".to_string()));
    }
    if cli.erate_graph < 0.0 || cli.erate_max < 0.0 {
        return Err(AsmError::Config("error thresholds must be at least 0.0".to_string()));
    }

    let mut graph_params = BestGraphParams {
        erate_graph: cli.erate_graph,
        erate_max: cli.erate_max.max(cli.erate_graph),
        erate_forced: cli.erate_forced,
        percentile: cli.percentile,
        min_reads_best: cli.min_reads_best,
        lopsided_diff: 25.0,
        spur_depth: cli.spur_depth,
        covgap_olap: cli.covgap_olap,
        ..Default::default()
    };

    graph_params.covgap_type = CovGapType::parse(&cli.covgap_type)
        .ok_or_else(|| AsmError::Config(format!("unknown --covgaptype '{}'", cli.covgap_type)))?;

    graph_params.lopsided_mode = match cli.lopsided[0].to_lowercase().as_str() {
        "off" => LopsidedMode::Off,
        "noseed" => LopsidedMode::NoSeed,
        "nobest" => LopsidedMode::NoBest,
        other => return Err(AsmError::Config(format!("unknown --lopsided mode '{}'", other))),
    };
    if let Some(diff) = cli.lopsided.get(1) {
        graph_params.lopsided_diff = diff
            .parse()
            .map_err(|_| AsmError::Config(format!("invalid --lopsided percent '{}'", diff)))?;
    }

    let mut filter_deadends = true;
    for f in &cli.nofilter {
        match f.to_lowercase().as_str() {
            "higherror" => graph_params.filter_high_error = false,
            "lopsided" => graph_params.filter_lopsided = false,
            "spur" => graph_params.filter_spur = false,
            "deadends" => filter_deadends = false,
            other => return Err(AsmError::Config(format!("invalid filter '{}' for --nofilter", other))),
        }
    }

    let unassembled = UnassembledParams {
        few_reads: parse_field(&cli.unassembled[0], "--unassembled fewReads")?,
        too_short: parse_field(&cli.unassembled[1], "--unassembled tooShort")?,
        span_fraction: parse_field(&cli.unassembled[2], "--unassembled spanFraction")?,
        lowcov_fraction: parse_field(&cli.unassembled[3], "--unassembled lowcovFraction")?,
        lowcov_depth: parse_field(&cli.unassembled[4], "--unassembled lowcovDepth")?,
    };

    if let Some(stop) = &cli.stop {
        if stop != "edges" && stop != "chunkgraph" {
            return Err(AsmError::Config(format!("unknown --stop phase '{}'", stop)));
        }
    }

    tigbuild::parallel::set_num_threads(cli.threads).map_err(AsmError::Config)?;

    let mem_limit = if cli.mem_gb > 0.0 {
        (cli.mem_gb * 1024.0 * 1024.0 * 1024.0) as u64
    } else {
        u64::MAX
    };

    info!("tigbuild {}", tigbuild::VERSION);
    info!("  memory limit      {}", if mem_limit == u64::MAX { "unlimited".to_string() } else { format!("{} GB", cli.mem_gb) });
    info!("  threads           {}", if cli.threads == 0 { "all cores".to_string() } else { cli.threads.to_string() });
    info!("  genome size       {}", cli.genome_size);
    info!("  min overlap       {}", cli.min_overlap);
    info!("  min intersect     {}", cli.min_intersect);
    info!("  max placements    {}", cli.max_placements);
    info!("  erate graph/max   {:.3}/{:.3}", cli.erate_graph, cli.erate_max);
    info!("  deviations g/b/r  {:.1}/{:.1}/{:.1}", cli.deviation_graph, cli.deviation_bubble, cli.deviation_repeat);
    info!("  similarity g/b/r  {:.3}/{:.3}/{:.3}", cli.similarity_graph, cli.similarity_bubble, cli.similarity_repeat);
    info!("  confusion abs/pct {}/{:.1}", cli.confused_absolute, cli.confused_percent);

    //
    //  Load and filter overlaps; build the graph.
    //

    info!("== LOADING AND FILTERING OVERLAPS ==");

    let ri = ReadInfo::from_store(&cli.seq_store, cli.min_read_len, u32::MAX)?;
    info!(
        "loaded {} reads ({} deleted), {} bases",
        ri.num_reads(),
        ri.num_deleted(),
        ri.num_bases()
    );

    let cache = OverlapCache::load(
        &cli.ovl_store,
        Some(&cli.prefix),
        &ri,
        &CacheParams {
            max_erate: cli.erate_max.max(cli.erate_graph),
            min_overlap: cli.min_overlap,
            min_olap_percent: cli.min_olap_percent,
            mem_limit,
            genome_size: cli.genome_size,
        },
    )?;

    let og = BestOverlapGraph::build(&ri, &cache, &graph_params);

    if cli.stop.as_deref() == Some("edges") {
        let mut path = cli.prefix.as_os_str().to_owned();
        path.push(".best.edges");
        let path = PathBuf::from(path);
        let mut w = std::io::BufWriter::new(std::fs::File::create(&path)?);
        og.write_edges(&ri, &mut w)?;
        info!("stopping after best edges; wrote {}", path.display());
        return Ok(());
    }

    let mut cg = ChunkGraph::build(&ri, &og);

    if cli.stop.as_deref() == Some("chunkgraph") {
        info!("stopping after chunk graph");
        return Ok(());
    }

    //
    //  Greedy construction.
    //

    info!("== BUILDING GREEDY TIGS ==");

    let mut tigs = TigVector::new(ri.num_reads());

    populate_unitigs(&ri, &og, &mut cg, &mut tigs);
    break_singleton_tigs(&mut tigs);

    //  The greedy layout used one hang per read; refit with everything.
    tigs.optimize_positions(&ri, &cache);
    split_discontinuous(&mut tigs, cli.min_overlap);

    for id in 1..=ri.num_reads() {
        if tigs.tig_of_read(id) != 0 {
            og.set_backbone(id, true);
        }
    }

    //
    //  Place contained and unplaced reads.
    //

    info!("== PLACING CONTAINED READS ==");

    tigs.compute_error_profiles(&cache);
    place_unplaced_using_all_overlaps(&ri, &cache, &og, &mut tigs, cli.deviation_graph, og.report_error_limit());

    tigs.optimize_positions(&ri, &cache);
    split_discontinuous(&mut tigs, cli.min_overlap);

    //
    //  Merge orphans, then mark bubbles.
    //

    info!("== MERGING ORPHANS ==");

    tigs.compute_error_profiles(&cache);
    merge_orphans(&ri, &cache, &og, &mut tigs, cli.deviation_graph, og.report_error_limit(), false);

    info!("== MARKING BUBBLES ==");

    merge_orphans(&ri, &cache, &og, &mut tigs, cli.deviation_bubble, cli.similarity_bubble, true);

    classify_unassembled(&mut tigs, &unassembled);

    //
    //  Find and break repeats.
    //

    info!("== BREAKING REPEATS ==");

    tigs.compute_error_profiles(&cache);
    mark_repeat_reads(
        &ri,
        &cache,
        &og,
        &mut tigs,
        &RepeatParams {
            deviation: cli.deviation_repeat,
            erate_limit: og.report_error_limit(),
            min_overlap: cli.min_overlap,
            confused_absolute: cli.confused_absolute,
            confused_percent: cli.confused_percent,
            shatter_repeats: cli.shatter_repeats,
        },
    );

    //
    //  Cleanup and classification.
    //

    info!("== CLEANUP ==");

    split_discontinuous(&mut tigs, cli.min_overlap);
    promote_to_singleton(&ri, &mut tigs);

    if filter_deadends {
        split_discontinuous(&mut tigs, cli.min_overlap);
        promote_to_singleton(&ri, &mut tigs);
    }

    find_circular_contigs(&ri, &og, &mut tigs);

    //
    //  Output.
    //

    info!("== GENERATING OUTPUTS ==");

    set_parent_and_hang(&cache, &mut tigs);
    tigs.check_membership();

    let mut out = cli.prefix.as_os_str().to_owned();
    out.push(".ctg.tigStore");
    write_tigs(&tigs, PathBuf::from(out))?;

    info!("Bye.");
    Ok(())
}

fn parse_field<T: std::str::FromStr>(s: &str, what: &str) -> Result<T> {
    s.parse()
        .map_err(|_| AsmError::Config(format!("invalid value '{}' for {}", s, what)))
}
