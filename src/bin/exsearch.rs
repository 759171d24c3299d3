use anyhow::{bail, Result};
use clap::Parser;
use exsearch::{
    CancelToken, Objective, Pools, RoiDefinition, Search, SearchConfig, SearchStatus,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "exsearch", about = "Exhaustive TI montage search over a leadfield")]
struct Args {
    /// Leadfield artifact (leadfield + node_volumes + node_coords)
    #[arg(long)]
    leadfield: PathBuf,

    /// ROI artifact (mask over the leadfield nodes)
    #[arg(long)]
    roi: PathBuf,

    /// Candidate electrodes for channel 1, anode (comma-separated)
    #[arg(long)]
    e1_plus: String,

    /// Candidate electrodes for channel 1, cathode
    #[arg(long)]
    e1_minus: String,

    /// Candidate electrodes for channel 2, anode
    #[arg(long)]
    e2_plus: String,

    /// Candidate electrodes for channel 2, cathode
    #[arg(long)]
    e2_minus: String,

    /// Total current across both channels, mA (default: 2.0)
    #[arg(long, default_value_t = 2.0)]
    total_current: f64,

    /// Per-channel current limit, mA (default: 1.5)
    #[arg(long, default_value_t = 1.5)]
    channel_limit: f64,

    /// Current step for the ratio sweep, mA (default: 0.1)
    #[arg(long, default_value_t = 0.1)]
    current_step: f64,

    /// Ranking objective: mean, max or focality (default: mean)
    #[arg(long, default_value = "mean")]
    objective: Objective,

    /// Rows printed from the top of the ranking (default: 10)
    #[arg(long, default_value_t = 10)]
    top_n: usize,

    /// Reject montages that reuse an electrode across slots
    #[arg(long)]
    forbid_reuse: bool,

    /// Score combinations on one thread instead of the rayon pool
    #[arg(long)]
    sequential: bool,

    /// Stop after this many scored combinations (partial scan)
    #[arg(long)]
    max_combinations: Option<u64>,

    /// Ranked table output, CSV
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Full report output, JSON
    #[arg(long)]
    json: Option<PathBuf>,
}

fn pool(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let store = exsearch::LeadfieldStore::load(&args.leadfield)?;
    println!(
        "Loaded {} electrodes × {} nodes from {}",
        store.n_electrodes(),
        store.domain_size(),
        args.leadfield.display()
    );

    let roi = RoiDefinition::load(&args.roi)?;

    let cfg = SearchConfig {
        pools: Pools {
            e1_plus: pool(&args.e1_plus),
            e1_minus: pool(&args.e1_minus),
            e2_plus: pool(&args.e2_plus),
            e2_minus: pool(&args.e2_minus),
        },
        total_current: args.total_current,
        channel_limit: args.channel_limit,
        current_step: args.current_step,
        objective: args.objective,
        top_n: args.top_n,
        forbid_reuse: args.forbid_reuse,
        parallel: !args.sequential,
        ..SearchConfig::default()
    };

    let search = Search::new(&store, roi, cfg)?;
    println!("Search space: {} combinations", search.total());

    let token = match args.max_combinations {
        Some(n) => CancelToken::after_polls(n),
        None => CancelToken::new(),
    };
    let report = search.run_with_cancel(&token)?;

    if report.status == SearchStatus::Aborted {
        println!(
            "Aborted after {} of {} combinations; partial results follow",
            report.attempted, report.total
        );
    }
    println!(
        "Scored {}/{} combinations ({} failed, {} skipped) in {:.2} s",
        report.succeeded(),
        report.total,
        report.failures.len(),
        report.skipped,
        report.elapsed.as_secs_f64()
    );
    for f in &report.failures {
        println!("  FAILED {} — {}", f.montage, f.reason);
    }

    if report.records.is_empty() {
        bail!("no combination produced a valid score");
    }

    println!("\nTop {}:", args.top_n.min(report.records.len()));
    println!(
        "{:>4}  {:<28}  {:>12}  {:>12}  {:>10}",
        "rank", "montage", "TImean_ROI", "TImax_ROI", "focality"
    );
    for (i, r) in report.top(args.top_n).iter().enumerate() {
        println!(
            "{:>4}  {:<28}  {:>12.4e}  {:>12.4e}  {:>10.4}",
            i + 1,
            format!(
                "{}-{} / {}-{} {:.1}:{:.1}",
                r.montage.e1_plus,
                r.montage.e1_minus,
                r.montage.e2_plus,
                r.montage.e2_minus,
                r.montage.ratio.i1,
                r.montage.ratio.i2
            ),
            r.stats.roi_mean,
            r.stats.roi_max,
            r.stats.focality
        );
    }

    if let Some(path) = &args.csv {
        report.write_csv(path)?;
        println!("Ranked table → {}", path.display());
    }
    if let Some(path) = &args.json {
        report.write_json(path)?;
        println!("Report → {}", path.display());
    }

    Ok(())
}
