use super::{exit_code_for, load_config};
use crate::cli::WatchArgs;
use crate::exit_codes;
use crate::output;
use scopechain_rs::{
    connect_all, AcquisitionSession, ChainConfig, LogMagnitudeSpectrum, ReadReport,
    RingBufferBank, SampleTransform, SessionStats, SourceSpec, SourceState, StreamResult,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Serialize)]
struct SourceSummary {
    index: usize,
    label: String,
    state: SourceState,
}

#[derive(Serialize)]
struct VectorStats {
    min: f64,
    max: f64,
    mean: f64,
    rms: f64,
}

#[derive(Serialize)]
struct ChannelSummary {
    channel: usize,
    source: usize,
    selector: u8,
    filled: usize,
    inserts: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    latest: Option<VectorStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    peak_frequency: Option<f64>,
}

#[derive(Serialize)]
struct WatchSummary {
    session_id: String,
    sample_rate: Option<f64>,
    depth: usize,
    width: usize,
    sources: Vec<SourceSummary>,
    channels: Vec<ChannelSummary>,
    stats: SessionStats,
}

fn build_config(args: &WatchArgs) -> StreamResult<ChainConfig> {
    let mut config = load_config(args.config.as_deref())?;
    args.layout.apply(&mut config);
    if let Some(depth) = args.depth {
        config.depth = depth;
    }
    if let Some(fill) = &args.fill {
        config.fill = fill.parse()?;
    }
    if args.mean_removal {
        config.mean_removal = true;
    }
    if let Some(tick) = args.tick_ms {
        config.tick_ms = tick;
    }
    config.validate()?;
    Ok(config)
}

fn vector_stats(values: impl Iterator<Item = f64>) -> Option<VectorStats> {
    let mut count = 0usize;
    let (mut min, mut max, mut sum, mut squares) = (f64::INFINITY, f64::NEG_INFINITY, 0.0, 0.0);
    for v in values.filter(|v| v.is_finite()) {
        count += 1;
        min = min.min(v);
        max = max.max(v);
        sum += v;
        squares += v * v;
    }
    if count == 0 {
        return None;
    }
    Some(VectorStats {
        min,
        max,
        mean: sum / count as f64,
        rms: (squares / count as f64).sqrt(),
    })
}

fn summarize(session: &AcquisitionSession, frequencies: Option<&[f64]>) -> WatchSummary {
    let bank = session.bank();
    let connections = session.connections();
    let demux = connections.demux();

    let sources = connections
        .labels()
        .into_iter()
        .enumerate()
        .map(|(index, label)| SourceSummary {
            index,
            label: label.to_string(),
            state: connections.state(index).unwrap_or(SourceState::Closed),
        })
        .collect();

    let channels = (0..bank.channel_count())
        .map(|channel| {
            let (source, selector) = demux.locate(channel);
            let filled = bank.filled(channel);
            let latest = if filled > 0 {
                bank.latest(channel)
                    .and_then(|v| vector_stats(v.iter().copied()))
            } else {
                None
            };
            let peak_frequency = match (frequencies, filled > 0) {
                (Some(freqs), true) => bank.transformed_slot(channel, 0).and_then(|spectrum| {
                    spectrum
                        .iter()
                        .enumerate()
                        .filter(|(_, v)| v.is_finite())
                        .max_by(|a, b| a.1.total_cmp(b.1))
                        .and_then(|(i, _)| freqs.get(i).copied())
                }),
                _ => None,
            };
            ChannelSummary {
                channel,
                source,
                selector,
                filled,
                inserts: bank.inserts(channel),
                latest,
                peak_frequency,
            }
        })
        .collect();

    WatchSummary {
        session_id: session.id().to_string(),
        sample_rate: session.sample_rate(),
        depth: bank.depth(),
        width: bank.width(),
        sources,
        channels,
        stats: session.stats(),
    }
}

fn print_text(summary: &WatchSummary) {
    println!("Session {}", summary.session_id);
    if let Some(rate) = summary.sample_rate {
        println!("Sample rate: {:.3} Msps", rate / 1e6);
    }
    for source in &summary.sources {
        println!("  source {} {:<24} {:?}", source.index, source.label, source.state);
    }
    for channel in &summary.channels {
        let latest = channel
            .latest
            .as_ref()
            .map(|s| {
                format!(
                    "min {:.4} max {:.4} mean {:.4} rms {:.4}",
                    s.min, s.max, s.mean, s.rms
                )
            })
            .unwrap_or_else(|| "-".to_string());
        let peak = channel
            .peak_frequency
            .map(|f| format!(" peak {:.1} Hz", f))
            .unwrap_or_default();
        println!(
            "  ch {:<3} ({}-{}) {:>3}/{} {}{}",
            channel.channel,
            channel.source,
            channel.selector,
            channel.filled,
            summary.depth,
            latest,
            peak
        );
    }
    println!(
        "{} reads, {} records, {} dropped lines, {:.2} s",
        summary.stats.reads,
        summary.stats.records_inserted,
        summary.stats.lines_dropped,
        summary.stats.elapsed_secs
    );
}

pub async fn execute(args: WatchArgs) -> i32 {
    let config = match build_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };

    let specs = match args
        .sources
        .iter()
        .map(|s| s.parse::<SourceSpec>())
        .collect::<Result<Vec<_>, _>>()
    {
        Ok(specs) => specs,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };

    let mut frequencies = None;
    let transform: Option<Arc<dyn SampleTransform>> = match (args.spectrum, args.sample_rate) {
        (true, Some(rate)) => {
            match LogMagnitudeSpectrum::for_band(config.width, rate, args.low_bin, args.max_frequency) {
                Ok(spectrum) => {
                    frequencies = spectrum.frequencies();
                    Some(Arc::new(spectrum) as Arc<dyn SampleTransform>)
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    return exit_codes::INPUT_ERROR;
                }
            }
        }
        (true, None) => {
            eprintln!("Error: --spectrum needs --sample-rate");
            return exit_codes::INPUT_ERROR;
        }
        (false, _) => None,
    };

    if !args.quiet {
        eprintln!("Connecting {} sources...", specs.len());
    }
    let sources = match connect_all(&specs, args.command.as_deref()).await {
        Ok(sources) => sources,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_code_for(&e);
        }
    };

    let mut session = match AcquisitionSession::from_config(&config, sources, transform) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_code_for(&e);
        }
    };
    if !args.quiet {
        eprintln!(
            "  {} channels, depth {}, width {}",
            session.bank().channel_count(),
            config.depth,
            config.width
        );
    }

    let cancel = CancellationToken::new();
    if let Some(ms) = args.duration_ms {
        let timer = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            timer.cancel();
        });
    }

    let result = session
        .run(
            Duration::from_millis(config.tick_ms),
            Duration::from_millis(config.poll_timeout_ms),
            cancel,
            |report: &ReadReport, _bank: &RingBufferBank| {
                log::debug!(
                    "{} records into {} channels",
                    report.records,
                    report.channels.len()
                );
                for fault in &report.failed {
                    log::warn!("{}", fault.error);
                }
            },
        )
        .await;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        return exit_code_for(&e);
    }

    if let (Some(expected), Some(actual)) = (args.sample_rate, session.sample_rate()) {
        if expected != actual {
            log::warn!(
                "Streams report {} Hz, spectrum axis assumes {} Hz",
                actual,
                expected
            );
        }
    }

    let summary = summarize(&session, frequencies.as_deref());
    if args.json {
        if let Err(e) = output::print_json(&summary, args.compact, args.output.as_deref()) {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    } else {
        print_text(&summary);
    }

    exit_codes::SUCCESS
}
