// Line protocol decoding
//
// A line is `[sequence] [sample_rate] selector sample_0 ... sample_{W-1}`,
// whitespace separated. Decoding is pure; the shared sample rate is tracked
// separately because a mismatch is a chain-level failure, not a line-level one.

use crate::config::LineLayout;
use crate::error::{ProtocolError, StreamError, StreamResult};

/// A validated protocol line
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedLine {
    pub sequence: Option<u64>,
    pub sample_rate: Option<f64>,
    pub selector: u8,
    pub samples: Vec<f64>,
}

/// Validates raw lines against a fixed layout and width
#[derive(Debug, Clone)]
pub struct LineDecoder {
    layout: LineLayout,
    width: usize,
    selectors_per_source: usize,
    sample_rate: Option<f64>,
}

impl LineDecoder {
    pub fn new(layout: LineLayout, width: usize, selectors_per_source: usize) -> Self {
        Self {
            layout,
            width,
            selectors_per_source,
            sample_rate: None,
        }
    }

    pub fn layout(&self) -> LineLayout {
        self.layout
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn selectors_per_source(&self) -> usize {
        self.selectors_per_source
    }

    /// Sample rate shared by every source, once the first line reported one
    pub fn sample_rate(&self) -> Option<f64> {
        self.sample_rate
    }

    /// Decode raw bytes as read from a source (trailing newline allowed)
    pub fn decode_bytes(&self, line: &[u8]) -> Result<DecodedLine, ProtocolError> {
        let text = std::str::from_utf8(line).map_err(|_| ProtocolError::Encoding)?;
        self.decode(text)
    }

    pub fn decode(&self, line: &str) -> Result<DecodedLine, ProtocolError> {
        let tokens: Vec<&str> = line.split_ascii_whitespace().collect();
        let expected = self.layout.line_tokens(self.width);
        if tokens.len() != expected {
            return Err(ProtocolError::MalformedLength {
                expected,
                actual: tokens.len(),
            });
        }

        let mut meta = tokens.iter();

        let sequence = if self.layout.sequence {
            let token = meta.next().copied().unwrap_or_default();
            Some(
                token
                    .parse::<u64>()
                    .map_err(|_| ProtocolError::InvalidSequence(token.to_string()))?,
            )
        } else {
            None
        };

        let sample_rate = if self.layout.sample_rate {
            let token = meta.next().copied().unwrap_or_default();
            match token.parse::<f64>() {
                Ok(rate) if rate.is_finite() && rate > 0.0 => Some(rate),
                _ => return Err(ProtocolError::InvalidRate(token.to_string())),
            }
        } else {
            None
        };

        let token = meta.next().copied().unwrap_or_default();
        let selector = self.parse_selector(token)?;

        let offset = self.layout.metadata_tokens();
        let samples = tokens[offset..]
            .iter()
            .enumerate()
            .map(|(position, token)| {
                token.parse::<f64>().map_err(|_| ProtocolError::InvalidSample {
                    position,
                    token: token.to_string(),
                })
            })
            .collect::<Result<Vec<f64>, _>>()?;

        Ok(DecodedLine {
            sequence,
            sample_rate,
            selector,
            samples,
        })
    }

    fn parse_selector(&self, token: &str) -> Result<u8, ProtocolError> {
        let invalid = || ProtocolError::InvalidSelector {
            token: token.to_string(),
            max: self.selectors_per_source,
        };
        let selector = token.parse::<u8>().map_err(|_| invalid())?;
        if selector == 0 || usize::from(selector) > self.selectors_per_source {
            return Err(invalid());
        }
        Ok(selector)
    }

    /// Establish the shared sample rate or verify a line against it
    ///
    /// The first rate seen wins; any later disagreement is fatal because the
    /// bank geometry and every derived axis assume one rate for the chain.
    pub fn check_rate(&mut self, source_label: &str, rate: f64) -> StreamResult<()> {
        match self.sample_rate {
            None => {
                log::info!(
                    "Sample rate established by {}: {:.3} Msps",
                    source_label,
                    rate / 1e6
                );
                self.sample_rate = Some(rate);
                Ok(())
            }
            Some(expected) if expected == rate => Ok(()),
            Some(expected) => Err(StreamError::ConfigurationInconsistency {
                source_label: source_label.to_string(),
                expected,
                actual: rate,
            }),
        }
    }
}
