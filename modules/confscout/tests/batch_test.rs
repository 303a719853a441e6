use std::sync::Arc;
use std::time::Duration;

use confscout::batch::{BatchProcessor, BatchSettings, BatchSummary};
use confscout::extraction::Provenance;
use confscout::testing::MockExtractor;
use confscout_common::{ConferenceCandidate, ExtractedFields};

fn candidate(i: usize) -> ConferenceCandidate {
    ConferenceCandidate {
        title: format!("Finance Conference {i:02}"),
        conference_dates: format!("{} May 2026", i + 1),
        ..Default::default()
    }
}

fn fields(i: usize) -> ExtractedFields {
    ExtractedFields {
        submission_deadline: format!("2026/01/{:02}", i + 1),
        ..Default::default()
    }
}

#[tokio::test]
async fn results_keep_input_order_across_chunks() {
    let mut extractor = MockExtractor::new();
    for i in 0..7 {
        extractor = extractor.on_title(&format!("Finance Conference {i:02}"), fields(i));
    }
    let extractor = Arc::new(extractor);
    let batch = BatchProcessor::new(
        extractor.clone(),
        BatchSettings {
            concurrency: 3,
            chunk_size: 3,
            chunk_pause: Duration::ZERO,
        },
    );

    let results = batch.process_all((0..7).map(candidate).collect()).await;

    assert_eq!(results.len(), 7);
    for (i, (candidate, result)) in results.iter().enumerate() {
        assert_eq!(candidate.title, format!("Finance Conference {i:02}"));
        assert_eq!(result.fields, fields(i));
    }
    assert_eq!(extractor.calls().len(), 7);
}

#[tokio::test]
async fn one_bad_item_only_blanks_its_own_slot() {
    let extractor = MockExtractor::new()
        .on_title("Finance Conference 00", fields(0))
        .failing("Finance Conference 01")
        .panicking("Finance Conference 02")
        .on_title("Finance Conference 03", fields(3));
    let batch = BatchProcessor::new(
        Arc::new(extractor),
        BatchSettings {
            concurrency: 2,
            chunk_size: 10,
            chunk_pause: Duration::ZERO,
        },
    );

    let results = batch.process_all((0..4).map(candidate).collect()).await;

    let provenance: Vec<_> = results.iter().map(|(_, r)| r.provenance).collect();
    assert_eq!(
        provenance,
        vec![
            Provenance::Extracted,
            Provenance::Failed,
            Provenance::Failed,
            Provenance::Extracted,
        ]
    );
    assert!(results[2].1.fields.is_empty());
    assert_eq!(results[3].1.fields, fields(3));
    assert_eq!(
        BatchSummary::of(&results),
        BatchSummary {
            extracted: 2,
            cached: 0,
            failed: 2
        }
    );
}

#[tokio::test]
async fn in_flight_calls_never_exceed_the_gate() {
    let extractor = Arc::new(MockExtractor::new().with_latency(Duration::from_millis(20)));
    let batch = BatchProcessor::new(
        extractor.clone(),
        BatchSettings {
            concurrency: 3,
            chunk_size: 8,
            chunk_pause: Duration::ZERO,
        },
    );

    let results = batch.process_all((0..8).map(candidate).collect()).await;

    assert_eq!(results.len(), 8);
    assert!(extractor.peak_in_flight() <= 3, "peak {}", extractor.peak_in_flight());
    assert!(extractor.peak_in_flight() > 1, "calls never overlapped");
}

#[tokio::test]
async fn chunks_run_one_at_a_time() {
    let extractor = Arc::new(MockExtractor::new().with_latency(Duration::from_millis(20)));
    let batch = BatchProcessor::new(
        extractor.clone(),
        BatchSettings {
            concurrency: 5,
            chunk_size: 2,
            chunk_pause: Duration::ZERO,
        },
    );

    let results = batch.process_all((0..6).map(candidate).collect()).await;

    assert_eq!(results.len(), 6);
    assert_eq!(extractor.peak_in_flight(), 2);
}
