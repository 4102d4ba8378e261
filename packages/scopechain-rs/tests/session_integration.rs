use scopechain_rs::{
    AcquisitionSession, ChainConfig, FillValue, FnTransform, Identity, LineLayout,
    LogMagnitudeSpectrum, SampleTransform, SourceState, StreamError, StreamSource,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{duplex, AsyncWriteExt, DuplexStream};

const WAIT: Duration = Duration::from_secs(5);

fn pipe(label: &str) -> (StreamSource, DuplexStream) {
    let (reader, writer) = duplex(64 * 1024);
    (StreamSource::new(label, reader), writer)
}

async fn send(writer: &mut DuplexStream, line: &str) {
    writer.write_all(line.as_bytes()).await.unwrap();
    writer.write_all(b"\n").await.unwrap();
}

fn config(width: usize, depth: usize, selectors: usize) -> ChainConfig {
    ChainConfig {
        width,
        depth,
        selectors_per_source: selectors,
        ..ChainConfig::default()
    }
}

/// One source, one selector, depth 2, width 3: the third vector evicts the first
#[tokio::test]
async fn test_three_line_rotation() {
    let (source, mut writer) = pipe("board");
    let mut session =
        AcquisitionSession::from_config(&config(3, 2, 1), vec![source], Some(Arc::new(Identity)))
            .unwrap();

    for value in ["1.0", "2.0", "3.0"] {
        send(&mut writer, &format!("1 {v} {v} {v}", v = value)).await;
        let report = session.read(WAIT).await.unwrap();
        assert_eq!(report.channels.iter().copied().collect::<Vec<_>>(), vec![0]);
    }

    let bank = session.bank();
    assert_eq!(bank.raw_slot(0, 0).unwrap().to_vec(), vec![3.0, 3.0, 3.0]);
    assert_eq!(bank.raw_slot(0, 1).unwrap().to_vec(), vec![2.0, 2.0, 2.0]);
    assert_eq!(bank.raw_history(0).unwrap(), bank.transformed_history(0).unwrap());
    assert_eq!(bank.inserts(0), 3);
}

#[tokio::test]
async fn test_channel_ids_follow_registration_order() {
    // [A, B]: A's selector 2 is channel 1
    let (a, mut wa) = pipe("A");
    let (b, _wb) = pipe("B");
    let mut session = AcquisitionSession::from_config(&config(2, 2, 2), vec![a, b], None).unwrap();
    send(&mut wa, "2 0.5 0.5").await;
    let report = session.read(WAIT).await.unwrap();
    assert_eq!(report.channels.iter().copied().collect::<Vec<_>>(), vec![1]);

    // [B, A]: the same line from A is channel 3
    let (a, mut wa) = pipe("A");
    let (b, _wb) = pipe("B");
    let mut session = AcquisitionSession::from_config(&config(2, 2, 2), vec![b, a], None).unwrap();
    send(&mut wa, "2 0.5 0.5").await;
    let report = session.read(WAIT).await.unwrap();
    assert_eq!(report.channels.iter().copied().collect::<Vec<_>>(), vec![3]);
    assert_eq!(session.bank().filled(3), 1);
    assert_eq!(session.bank().filled(1), 0);
}

#[tokio::test]
async fn test_malformed_lines_leave_bank_untouched() {
    let (source, mut writer) = pipe("board");
    let mut session = AcquisitionSession::from_config(&config(3, 2, 2), vec![source], None).unwrap();

    send(&mut writer, "1 1.0 2.0").await;
    send(&mut writer, "7 1.0 2.0 3.0").await;
    send(&mut writer, "1 1.0 oops 3.0").await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let report = session.read(Duration::ZERO).await.unwrap();
    assert!(report.channels.is_empty());
    assert_eq!(report.dropped_lines, 3);
    assert_eq!(session.bank().filled(0), 0);
    assert_eq!(session.bank().filled(1), 0);
    assert_eq!(session.connections().state(0), Some(SourceState::Active));
}

#[tokio::test]
async fn test_empty_read_is_idempotent() {
    let mut cfg = config(2, 2, 2);
    cfg.fill = FillValue::Nan;
    let (source, _writer) = pipe("idle");
    let mut session = AcquisitionSession::from_config(&cfg, vec![source], None).unwrap();

    let before = session.bank().raw_snapshot();
    for _ in 0..3 {
        let report = session.read(Duration::ZERO).await.unwrap();
        assert!(report.is_empty());
    }
    let after = session.bank().raw_snapshot();
    assert!(before.iter().zip(after.iter()).all(|(x, y)| x.is_nan() && y.is_nan()));
    assert_eq!(session.stats().records_inserted, 0);
}

#[tokio::test]
async fn test_rate_mismatch_stops_the_chain() {
    let mut cfg = config(2, 2, 1);
    cfg.layout = LineLayout {
        sequence: false,
        sample_rate: true,
    };
    let (a, mut wa) = pipe("A");
    let (b, mut wb) = pipe("B");
    let mut session = AcquisitionSession::from_config(&cfg, vec![a, b], None).unwrap();

    send(&mut wa, "1000 1 1.0 1.0").await;
    session.read(WAIT).await.unwrap();
    assert_eq!(session.sample_rate(), Some(1000.0));

    send(&mut wb, "2000 1 2.0 2.0").await;
    let err = session.read(WAIT).await.unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(
        err,
        StreamError::ConfigurationInconsistency { expected, actual, .. }
            if expected == 1000.0 && actual == 2000.0
    ));
    assert_eq!(session.bank().filled(1), 0);
    assert_eq!(session.stats().records_inserted, 1);
}

#[tokio::test]
async fn test_ended_source_is_reported_once_others_continue() {
    let (a, wa) = pipe("A");
    let (b, mut wb) = pipe("B");
    let mut session = AcquisitionSession::from_config(&config(1, 4, 2), vec![a, b], None).unwrap();

    drop(wa);
    let report = session.read(WAIT).await.unwrap();
    assert_eq!(report.closed, vec![0]);

    send(&mut wb, "1 4.0").await;
    let report = session.read(WAIT).await.unwrap();
    assert!(report.closed.is_empty());
    assert_eq!(report.channels.iter().copied().collect::<Vec<_>>(), vec![2]);
    assert_eq!(session.stats().sources_closed, 1);
    assert_eq!(session.connections().active_sources(), 1);
}

#[tokio::test]
async fn test_reattached_source_keeps_channels() {
    let (a, wa) = pipe("A");
    let (b, _wb) = pipe("B");
    let mut session = AcquisitionSession::from_config(&config(1, 4, 2), vec![a, b], None).unwrap();

    drop(wa);
    session.read(WAIT).await.unwrap();

    let (a2, mut wa2) = pipe("A-restarted");
    session.connections_mut().reattach(0, a2).unwrap();
    send(&mut wa2, "2 8.0").await;
    let report = session.read(WAIT).await.unwrap();
    assert_eq!(report.channels.iter().copied().collect::<Vec<_>>(), vec![1]);
    assert_eq!(session.bank().latest(1).unwrap().to_vec(), vec![8.0]);
}

#[tokio::test]
async fn test_transformed_history_stays_aligned() {
    let summed: Arc<dyn SampleTransform> = Arc::new(FnTransform::new(
        "sum",
        2,
        1,
        |input: &[f64], output: &mut [f64]| output[0] = input.iter().sum(),
    ));
    let (source, mut writer) = pipe("board");
    let mut session =
        AcquisitionSession::from_config(&config(2, 3, 1), vec![source], Some(summed)).unwrap();

    for i in 1..=5 {
        send(&mut writer, &format!("1 {} {}", i, i)).await;
        session.read(WAIT).await.unwrap();
    }

    let bank = session.bank();
    for slot in 0..3 {
        let raw = bank.raw_slot(0, slot).unwrap();
        let derived = bank.transformed_slot(0, slot).unwrap();
        assert_eq!(derived[0], raw.sum());
    }
    assert_eq!(bank.latest(0).unwrap().to_vec(), vec![5.0, 5.0]);
}

#[tokio::test]
async fn test_spectrum_session_from_capture_file() {
    let width = 64;
    let rate = 6400.0;
    let tone_bin = 8;
    let samples: Vec<String> = (0..width)
        .map(|n| {
            let phase = 2.0 * std::f64::consts::PI * tone_bin as f64 * n as f64 / width as f64;
            format!("{:.9}", phase.sin())
        })
        .collect();
    let line = format!("{} 1 {}\n", rate, samples.join(" "));

    let capture = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(capture.path(), line.repeat(3)).unwrap();

    let mut cfg = config(width, 4, 1);
    cfg.layout = LineLayout {
        sequence: false,
        sample_rate: true,
    };
    let spectrum = LogMagnitudeSpectrum::for_band(width, rate, 2, 3000.0).unwrap();
    let bins = spectrum.bins();

    let sources = scopechain_rs::connect_all(
        &[format!("file:{}", capture.path().display()).parse().unwrap()],
        None,
    )
    .await
    .unwrap();
    let mut session = AcquisitionSession::from_config(&cfg, sources, Some(Arc::new(spectrum))).unwrap();

    while session.connections().active_sources() > 0 {
        session.read(WAIT).await.unwrap();
    }

    let bank = session.bank();
    assert_eq!(bank.filled(0), 3);
    let latest = bank.transformed_slot(0, 0).unwrap();
    let peak = latest
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i + bins.start)
        .unwrap();
    assert_eq!(peak, tone_bin);
}
