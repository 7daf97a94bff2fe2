use crate::ingest::Discard;
use crate::replay::ReplaySummary;
use crate::stats::StatsSnapshot;
use crate::utils::format_number;

pub fn print_run_summary(stats: &StatsSnapshot, replay: &ReplaySummary) {
    println!("\n--- Flux Candidate Run ---");
    println!(
        "Input: {} files, {} lines ({} unparsable)",
        format_number(replay.files as u64),
        format_number(replay.lines as u64),
        format_number(replay.unparsable as u64)
    );
    println!("Events seen: {}", format_number(stats.events));
    println!(
        "Candidates created: {}, merges: {}",
        format_number(stats.created),
        format_number(stats.merged)
    );
    println!(
        "Finalized: {} on update, {} by sweep",
        format_number(stats.finalized_on_update),
        format_number(stats.finalized_by_sweep)
    );
    println!(
        "Emitted: {}, not qualified: {}",
        format_number(stats.emitted),
        format_number(stats.not_qualified)
    );
    println!(
        "Lines written: {} ({} rotations, {} write failures)",
        format_number(stats.lines_written),
        format_number(stats.rotations),
        format_number(stats.write_failures)
    );

    if stats.abandoned > 0 || stats.undelivered > 0 || stats.sweep_panics > 0 {
        println!(
            "Abandoned keys: {}, undelivered candidates: {}, failed sweeps: {}",
            format_number(stats.abandoned),
            format_number(stats.undelivered),
            format_number(stats.sweep_panics)
        );
    }

    let total = stats.total_discarded();
    println!("\nDiscarded events: {}", format_number(total));
    for reason in Discard::ALL {
        let count = stats.discarded(reason);
        if count > 0 {
            println!("- {}: {}", reason.as_str(), format_number(count));
        }
    }
}
