use super::*;
use crate::record::CsvRecordDecoder;
use std::io::Cursor;

const BASE_MS: u64 = 1_592_841_600_000;

fn line(caller: &str, caller_ip: &str, responder: &str, ok: bool, elapsed: u32, minute: u64) -> String {
    format!(
        "{},{},{},10.0.9.9,{},{},{}\n",
        caller,
        caller_ip,
        responder,
        ok,
        elapsed,
        BASE_MS + minute * 60_000 + 1_000
    )
}

fn tiny_blocks() -> AnalyzerConfig {
    AnalyzerConfig {
        block_size: 16,
        blocks_in_flight: 1,
        ..AnalyzerConfig::default()
    }
}

fn run(input: &str, config: &AnalyzerConfig) -> Result<IngestOutput> {
    ingest(Cursor::new(input.as_bytes().to_vec()), CsvRecordDecoder, config)
}

#[test]
fn test_blocks_never_split_records() {
    let mut input = String::new();
    for minute in 0..3 {
        for elapsed in 1..=50 {
            input.push_str(&line("svc_a", "10.0.0.1", "svc_b", true, elapsed, minute));
        }
    }

    let small = run(&input, &tiny_blocks()).unwrap();
    let large = run(&input, &AnalyzerConfig::default()).unwrap();

    assert_eq!(small.stats.records, 150);
    assert_eq!(large.stats.records, 150);
    assert!(small.stats.blocks > large.stats.blocks);
    assert_eq!(small.minute_count, 3);
    assert_eq!(small.stats.bytes, input.len() as u64);
}

#[test]
fn test_answers_per_minute() {
    let mut input = String::new();
    for elapsed in 1..=100 {
        input.push_str(&line("svc_a", "10.0.0.1", "svc_b", elapsed > 2, elapsed, 0));
    }
    input.push_str(&line("svc_a", "10.0.0.1", "svc_b", true, 7, 1));

    let output = run(&input, &AnalyzerConfig::default()).unwrap();
    let pair = output.topology.pairs()[0];
    let timeline = output.answers.timeline(pair.key()).unwrap();

    let first = timeline.minute(0).unwrap().answers()[0];
    assert_eq!(first.p99, 99);
    assert_eq!(first.success_rate, 9800);

    let second = timeline.minute(1).unwrap().answers()[0];
    assert_eq!(second.p99, 7);
    assert_eq!(second.success_rate, 10000);
}

#[test]
fn test_one_minute_skew_lands_in_previous_bucket() {
    let input = [
        line("svc_a", "10.0.0.1", "svc_b", true, 10, 0),
        line("svc_a", "10.0.0.1", "svc_b", true, 20, 1),
        line("svc_a", "10.0.0.1", "svc_b", true, 30, 0),
        line("svc_a", "10.0.0.1", "svc_b", true, 40, 2),
        line("svc_a", "10.0.0.1", "svc_b", true, 50, 1),
    ]
    .concat();

    let output = run(&input, &tiny_blocks()).unwrap();
    let pair = output.topology.pairs()[0];
    let timeline = output.answers.timeline(pair.key()).unwrap();
    assert_eq!(timeline.minute(0).unwrap().answers()[0].p99, 30);
    assert_eq!(timeline.minute(1).unwrap().answers()[0].p99, 50);
    assert_eq!(timeline.minute(2).unwrap().answers()[0].p99, 40);
}

#[test]
fn test_skew_beyond_one_minute_is_rejected() {
    let input = [
        line("svc_a", "10.0.0.1", "svc_b", true, 10, 0),
        line("svc_a", "10.0.0.1", "svc_b", true, 10, 1),
        line("svc_a", "10.0.0.1", "svc_b", true, 10, 2),
        line("svc_a", "10.0.0.1", "svc_b", true, 10, 0),
    ]
    .concat();

    let err = run(&input, &AnalyzerConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        AnalysisError::SkewExceeded {
            minute: 0,
            current: 2
        }
    ));
}

#[test]
fn test_first_record_late_moves_origin_back() {
    let input = [
        line("svc_a", "10.0.0.1", "svc_b", true, 10, 5),
        line("svc_a", "10.0.0.1", "svc_b", true, 20, 4),
    ]
    .concat();

    let output = run(&input, &AnalyzerConfig::default()).unwrap();
    assert_eq!(output.origin_minute, (BASE_MS / 60_000) as i64 + 4);
    assert_eq!(output.minute_count, 2);
    let pair = output.topology.pairs()[0];
    let timeline = output.answers.timeline(pair.key()).unwrap();
    assert_eq!(timeline.minute(0).unwrap().answers()[0].p99, 20);
    assert_eq!(timeline.minute(1).unwrap().answers()[0].p99, 10);
}

#[test]
fn test_gap_minutes_stay_empty() {
    let input = [
        line("svc_a", "10.0.0.1", "svc_b", true, 10, 0),
        line("svc_a", "10.0.0.1", "svc_b", true, 10, 4),
    ]
    .concat();

    let output = run(&input, &AnalyzerConfig::default()).unwrap();
    assert_eq!(output.minute_count, 5);
    assert_eq!(output.stats.minutes, 5);
    let pair = output.topology.pairs()[0];
    let timeline = output.answers.timeline(pair.key()).unwrap();
    assert!(timeline.minute(0).is_some());
    for minute in 1..4 {
        assert!(timeline.minute(minute).is_none());
    }
    assert!(timeline.minute(4).is_some());
}

#[test]
fn test_buckets_are_recycled() {
    let mut input = String::new();
    for minute in 0..20 {
        input.push_str(&line("svc_a", "10.0.0.1", "svc_b", true, 1, minute));
    }
    let output = run(&input, &AnalyzerConfig::default()).unwrap();
    assert!(output.stats.pool.allocated <= 3);
    assert_eq!(output.stats.pool.acquired, 20);
}

#[test]
fn test_decode_error_reports_line_offset() {
    let good = line("svc_a", "10.0.0.1", "svc_b", true, 10, 0);
    let input = format!("{}svc_a,10.0.0.1,svc_b,10.0.9.9,maybe,1,1\n", good);

    let err = run(&input, &tiny_blocks()).unwrap_err();
    match err {
        AnalysisError::Decode { offset, .. } => assert_eq!(offset, good.len() as u64),
        other => panic!("expected decode error, got {other:?}"),
    }
}

#[test]
fn test_empty_input() {
    let err = run("", &AnalyzerConfig::default()).unwrap_err();
    assert!(matches!(err, AnalysisError::EmptyInput));
}

#[test]
fn test_missing_trailing_newline_and_crlf() {
    let input = "svc_a,10.0.0.1,svc_b,10.0.9.9,true,3,1592841601000\r\n\
                 svc_a,10.0.0.1,svc_b,10.0.9.9,false,5,1592841602000";
    let output = run(input, &tiny_blocks()).unwrap();
    assert_eq!(output.stats.records, 2);
    let pair = output.topology.pairs()[0];
    let answer = output.answers.timeline(pair.key()).unwrap().minute(0).unwrap().answers()[0];
    assert_eq!(answer.p99, 5);
    assert_eq!(answer.success_rate, 5000);
}

#[test]
fn test_late_pairs_are_counted() {
    let input = [
        line("svc_a", "10.0.0.1", "svc_b", true, 1, 0),
        line("svc_a", "10.0.0.1", "svc_b", true, 1, 3),
        line("svc_a", "10.0.0.2", "svc_b", true, 1, 3),
    ]
    .concat();
    let output = run(&input, &AnalyzerConfig::default()).unwrap();
    assert_eq!(output.stats.late_pairs, 1);
    assert_eq!(output.topology.pairs().len(), 2);
}

#[test]
fn test_origin_shift_uses_final_minute_for_warmup() {
    // No warm-up window: every pair counts as late, including the one whose
    // record moved the origin back
    let config = AnalyzerConfig {
        warmup_minutes: 0,
        ..AnalyzerConfig::default()
    };
    let input = [
        line("svc_a", "10.0.0.1", "svc_b", true, 1, 5),
        line("svc_a", "10.0.0.2", "svc_b", true, 1, 4),
    ]
    .concat();
    let output = run(&input, &config).unwrap();
    assert_eq!(output.minute_count, 2);
    assert_eq!(output.stats.late_pairs, 2);
}

#[test]
fn test_shared_ip_key_keeps_every_service_edge() {
    let input = [
        "x,10.0.0.1,y,10.0.0.2,true,5,1592841601000\n",
        "z,10.0.0.1,y,10.0.0.2,true,9,1592841602000\n",
        "y,10.0.0.2,w,10.0.0.3,true,3,1592841603000\n",
    ]
    .concat();
    let output = run(&input, &AnalyzerConfig::default()).unwrap();

    assert_eq!(output.topology.services().len(), 4);
    assert_eq!(output.topology.graph().edge_count(), 3);
    // x→y and z→y share a key, so their samples land in one slot
    assert_eq!(output.topology.pairs().len(), 2);
    let pair = output.topology.pairs()[0];
    let answer = output.answers.timeline(pair.key()).unwrap().minute(0).unwrap().answers()[0];
    assert_eq!(answer.p99, 9);
    assert_eq!(output.stats.records, 3);
}

#[test]
fn test_invalid_config_fails_before_reading() {
    let config = AnalyzerConfig {
        bucket_pool_size: 1,
        ..AnalyzerConfig::default()
    };
    assert!(matches!(
        run("x", &config).unwrap_err(),
        AnalysisError::Config(_)
    ));
}

#[test]
fn test_root_cause_prefers_real_error() {
    let err = root_cause([
        Some(AnalysisError::StageFailed { stage: "reader" }),
        Some(AnalysisError::EmptyInput),
        None,
    ]);
    assert!(matches!(err, AnalysisError::EmptyInput));

    let err = root_cause([None, Some(AnalysisError::StageFailed { stage: "compute" })]);
    assert!(matches!(err, AnalysisError::StageFailed { stage: "compute" }));
}
