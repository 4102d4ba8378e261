use super::{exit_code_for, load_config};
use crate::cli::DecodeArgs;
use crate::exit_codes;
use crate::output;
use scopechain_rs::LineDecoder;
use serde::Serialize;
use std::io::{BufRead, BufReader, Read};

#[derive(Serialize)]
struct LineReport {
    line: usize,
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    selector: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sequence: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sample_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mean: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    samples: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct DecodeOutput {
    source: String,
    width: usize,
    lines: Vec<LineReport>,
    valid: usize,
    invalid: usize,
}

pub fn execute(args: DecodeArgs) -> i32 {
    let mut config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_code_for(&e);
        }
    };
    args.layout.apply(&mut config);
    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return exit_codes::INPUT_ERROR;
    }

    let (label, input): (String, Box<dyn Read>) = match &args.file {
        Some(path) => match std::fs::File::open(path) {
            Ok(file) => (path.clone(), Box::new(file)),
            Err(e) => {
                eprintln!("Error: Cannot open '{}': {}", path, e);
                return exit_codes::INPUT_ERROR;
            }
        },
        None => ("stdin".to_string(), Box::new(std::io::stdin())),
    };

    let mut decoder = LineDecoder::new(config.layout, config.width, config.selectors_per_source);
    let mut lines = Vec::new();

    for (index, chunk) in BufReader::new(input).split(b'\n').enumerate() {
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(e) => {
                eprintln!("Error: Failed to read {}: {}", label, e);
                return exit_codes::EXECUTION_ERROR;
            }
        };
        // Trailing blank lines in captures are not protocol lines
        if bytes.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        let line = index + 1;
        let report = match decoder.decode_bytes(&bytes) {
            Ok(decoded) => {
                if let Some(rate) = decoded.sample_rate {
                    if let Err(e) = decoder.check_rate(&label, rate) {
                        eprintln!("Error: line {}: {}", line, e);
                        return exit_code_for(&e);
                    }
                }
                let mean = decoded.samples.iter().sum::<f64>() / decoded.samples.len() as f64;
                LineReport {
                    line,
                    valid: true,
                    selector: Some(decoded.selector),
                    sequence: decoded.sequence,
                    sample_rate: decoded.sample_rate,
                    mean: Some(mean),
                    samples: args.samples.then_some(decoded.samples),
                    error: None,
                }
            }
            Err(e) => {
                log::warn!("{}: line {}: {}", label, line, e);
                LineReport {
                    line,
                    valid: false,
                    selector: None,
                    sequence: None,
                    sample_rate: None,
                    mean: None,
                    samples: None,
                    error: Some(e.to_string()),
                }
            }
        };
        lines.push(report);
    }

    let valid = lines.iter().filter(|l| l.valid).count();
    let result = DecodeOutput {
        source: label,
        width: config.width,
        invalid: lines.len() - valid,
        valid,
        lines,
    };

    if args.json {
        if let Err(e) = output::print_json(&result, false, None) {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    } else {
        for report in &result.lines {
            match (&report.error, report.selector) {
                (Some(err), _) => println!("line {}: invalid: {}", report.line, err),
                (None, Some(selector)) => println!(
                    "line {}: selector {}, {} samples, mean {:.6}",
                    report.line,
                    selector,
                    result.width,
                    report.mean.unwrap_or_default()
                ),
                (None, None) => {}
            }
        }
        println!(
            "{}: {} valid, {} invalid",
            result.source, result.valid, result.invalid
        );
    }

    if result.invalid > 0 {
        exit_codes::INPUT_ERROR
    } else {
        exit_codes::SUCCESS
    }
}
