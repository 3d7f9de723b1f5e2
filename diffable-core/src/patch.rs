//! Delta patch application.
//!
//! A diff is an ordered list of [`Instruction`]s. On the wire it is a JSON
//! array where two consecutive integers form a copy (`start`, `length`) out
//! of the base text and a string is a literal insert:
//!
//! ```text
//! ["hey ", 6, 5]   // insert "hey ", then copy 5 units starting at 6
//! ```
//!
//! Indices count UTF-16 code units, matching the generator that produces the
//! diffs and the scripting hosts that consume the reconstructed text.

use serde::Deserialize;
use serde_json::{Number, Value};

use crate::error::PatchError;
use crate::types::ResourceId;

/// One step of a reconstruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Copy `length` units of the base starting at `start`.
    Copy { start: i64, length: i64 },
    /// Append `text` verbatim.
    Insert { text: String },
}

impl Instruction {
    pub fn copy(start: i64, length: i64) -> Self {
        Self::Copy { start, length }
    }

    pub fn insert(text: impl Into<String>) -> Self {
        Self::Insert { text: text.into() }
    }
}

/// A decoded instruction stream.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "Vec<Value>")]
pub struct Diff {
    instructions: Vec<Instruction>,
}

impl Diff {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self { instructions }
    }

    /// Decode a JSON diff payload.
    pub fn parse(payload: &str) -> Result<Self, PatchError> {
        let values: Vec<Value> =
            serde_json::from_str(payload).map_err(|e| PatchError::Syntax(e.to_string()))?;
        Self::try_from(values)
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Reconstruct the new text of `identifier` from `base`.
    pub fn apply(&self, identifier: &ResourceId, base: &str) -> Result<String, PatchError> {
        apply(identifier, base, &self.instructions)
    }
}

impl From<Vec<Instruction>> for Diff {
    fn from(instructions: Vec<Instruction>) -> Self {
        Self::new(instructions)
    }
}

impl TryFrom<Vec<Value>> for Diff {
    type Error = PatchError;

    fn try_from(values: Vec<Value>) -> Result<Self, Self::Error> {
        let mut instructions = Vec::with_capacity(values.len());
        let mut elements = values.into_iter().enumerate();
        while let Some((index, value)) = elements.next() {
            match value {
                Value::String(text) => instructions.push(Instruction::Insert { text }),
                Value::Number(start) => {
                    let start = integer(index, &start)?;
                    let length = match elements.next() {
                        Some((length_index, Value::Number(length))) => {
                            integer(length_index, &length)?
                        }
                        Some((length_index, other)) => {
                            return Err(PatchError::Decode {
                                index: length_index,
                                reason: format!(
                                    "copy length must be a number, found {}",
                                    kind(&other)
                                ),
                            })
                        }
                        None => {
                            return Err(PatchError::Decode {
                                index,
                                reason: "copy start is not followed by a length".to_string(),
                            })
                        }
                    };
                    instructions.push(Instruction::Copy { start, length });
                }
                other => {
                    return Err(PatchError::Decode {
                        index,
                        reason: format!("unexpected {} element", kind(&other)),
                    })
                }
            }
        }
        Ok(Self { instructions })
    }
}

/// Reconstruct a string from `base` and `instructions`.
///
/// Fails on the first copy whose bounds fall outside `base`; nothing is
/// clamped or skipped. `base` is never modified.
pub fn apply(
    identifier: &ResourceId,
    base: &str,
    instructions: &[Instruction],
) -> Result<String, PatchError> {
    let dict: Vec<u16> = base.encode_utf16().collect();
    let base_len = dict.len();
    let mut output: Vec<u16> = Vec::with_capacity(base_len);

    for instruction in instructions {
        match instruction {
            Instruction::Copy { start, length } => {
                let (start, length) = (*start, *length);
                if start < 0 || start >= base_len as i64 {
                    return Err(PatchError::InvalidStart {
                        identifier: identifier.clone(),
                        start,
                        base_len,
                    });
                }
                let end = start.saturating_add(length);
                if end > base_len as i64 || end < start {
                    return Err(PatchError::InvalidEnd {
                        identifier: identifier.clone(),
                        start,
                        end,
                        base_len,
                    });
                }
                output.extend_from_slice(&dict[start as usize..end as usize]);
            }
            Instruction::Insert { text } => output.extend(text.encode_utf16()),
        }
    }

    String::from_utf16(&output).map_err(|_| PatchError::InvalidUtf16 {
        identifier: identifier.clone(),
    })
}

fn integer(index: usize, number: &Number) -> Result<i64, PatchError> {
    if let Some(n) = number.as_i64() {
        return Ok(n);
    }
    match number.as_f64() {
        Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 => {
            Ok(f as i64)
        }
        _ => Err(PatchError::Decode {
            index,
            reason: format!("copy index {number} is not an integer"),
        }),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn id() -> ResourceId {
        ResourceId::from("r1")
    }

    #[test]
    fn insert_then_copy_rebuilds_greeting() {
        let diff = Diff::new(vec![Instruction::insert("hey "), Instruction::copy(6, 5)]);
        assert_eq!(diff.apply(&id(), "hello world").unwrap(), "hey world");
    }

    #[test]
    fn copy_past_end_is_rejected() {
        let err = apply(&id(), "abc", &[Instruction::copy(0, 5)]).unwrap_err();
        assert_eq!(
            err,
            PatchError::InvalidEnd {
                identifier: id(),
                start: 0,
                end: 5,
                base_len: 3,
            }
        );
        assert_eq!(err.to_string(), "r1: Invalid end index: 5");
    }

    #[rstest]
    #[case(-1, 1)]
    #[case(3, 0)]
    #[case(7, 1)]
    fn out_of_range_start_is_rejected(#[case] start: i64, #[case] length: i64) {
        let err = apply(&id(), "abc", &[Instruction::copy(start, length)]).unwrap_err();
        assert!(
            matches!(err, PatchError::InvalidStart { start: s, base_len: 3, .. } if s == start),
            "got {err:?}"
        );
    }

    #[rstest]
    #[case(1, 3)]
    #[case(2, -1)]
    #[case(0, i64::MAX)]
    fn out_of_range_end_is_rejected(#[case] start: i64, #[case] length: i64) {
        let err = apply(&id(), "abc", &[Instruction::copy(start, length)]).unwrap_err();
        assert!(matches!(err, PatchError::InvalidEnd { .. }), "got {err:?}");
    }

    #[test]
    fn full_copy_reproduces_base() {
        let base = "function f() { return 42; }";
        let len = base.encode_utf16().count() as i64;
        assert_eq!(apply(&id(), base, &[Instruction::copy(0, len)]).unwrap(), base);
    }

    #[test]
    fn every_copy_fails_against_empty_base() {
        let err = apply(&id(), "", &[Instruction::copy(0, 0)]).unwrap_err();
        assert!(matches!(err, PatchError::InvalidStart { .. }));
        assert_eq!(apply(&id(), "", &[Instruction::insert("x")]).unwrap(), "x");
    }

    #[test]
    fn apply_is_deterministic() {
        let diff = Diff::parse(r#"[0, 3, "-", 4, 3, "!"]"#).unwrap();
        let first = diff.apply(&id(), "foo bar").unwrap();
        let second = diff.apply(&id(), "foo bar").unwrap();
        assert_eq!(first, "foo-bar!");
        assert_eq!(first, second);
    }

    #[test]
    fn indices_count_utf16_units() {
        // "é" is one unit, the emoji is a surrogate pair.
        let base = "é😀z";
        assert_eq!(apply(&id(), base, &[Instruction::copy(1, 2)]).unwrap(), "😀");
        assert_eq!(apply(&id(), base, &[Instruction::copy(3, 1)]).unwrap(), "z");
    }

    #[test]
    fn split_surrogate_pair_is_rejected() {
        let err = apply(&id(), "😀", &[Instruction::copy(0, 1)]).unwrap_err();
        assert_eq!(err, PatchError::InvalidUtf16 { identifier: id() });
    }

    #[test]
    fn parse_interleaved_payload() {
        let diff = Diff::parse(r#"["a", 0, 2, "b", 4, 1]"#).unwrap();
        assert_eq!(
            diff.instructions(),
            &[
                Instruction::insert("a"),
                Instruction::copy(0, 2),
                Instruction::insert("b"),
                Instruction::copy(4, 1),
            ]
        );
    }

    #[test]
    fn parse_accepts_integral_floats() {
        let diff = Diff::parse("[1.0, 2]").unwrap();
        assert_eq!(diff.instructions(), &[Instruction::copy(1, 2)]);
    }

    #[rstest]
    #[case("[0]", 0)]
    #[case(r#"[0, "x"]"#, 1)]
    #[case("[1.5, 2]", 0)]
    #[case(r#"["a", null]"#, 1)]
    #[case("[[6, 5]]", 0)]
    fn parse_rejects_malformed_elements(#[case] payload: &str, #[case] at: usize) {
        match Diff::parse(payload).unwrap_err() {
            PatchError::Decode { index, .. } => assert_eq!(index, at),
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[test]
    fn parse_rejects_non_array() {
        assert!(matches!(
            Diff::parse(r#"{"copy": 1}"#),
            Err(PatchError::Syntax(_))
        ));
    }

    #[test]
    fn empty_payload_yields_empty_output() {
        let diff = Diff::parse("[]").unwrap();
        assert!(diff.is_empty());
        assert_eq!(diff.apply(&id(), "anything").unwrap(), "");
    }
}
