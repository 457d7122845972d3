//! Test-suite persistence
//!
//! One XML file per test case: a `testcase` root with an
//! `initialization` child listing state valuations and one `input`
//! child per cycle. Valuation elements carry the flattened name in
//! their `variable` attribute and `true`, `false`, or a decimal
//! integer as text.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::Path;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use tracing::{debug, info};

use crate::errors::{AhornError, Result};
use crate::features::smt::Value;

use super::test_case::TestCase;

#[derive(Debug, Default)]
pub struct TestSuite {
    test_cases: Vec<TestCase>,
}

impl TestSuite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn test_cases(&self) -> &[TestCase] {
        &self.test_cases
    }

    pub fn len(&self) -> usize {
        self.test_cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.test_cases.is_empty()
    }

    pub fn push(&mut self, test_case: TestCase) {
        let duplicate = self
            .test_cases
            .iter()
            .any(|existing| existing.same_stimulus(&test_case));
        if !duplicate {
            self.test_cases.push(test_case);
        }
    }

    /// Load every `.xml` file of a directory, or a single file
    pub fn load(path: &Path) -> Result<Self> {
        let mut suite = TestSuite::new();
        if path.is_dir() {
            let mut entries: Vec<_> = std::fs::read_dir(path)?
                .collect::<std::io::Result<Vec<_>>>()?
                .into_iter()
                .map(|entry| entry.path())
                .filter(|path| path.extension().is_some_and(|e| e == "xml"))
                .collect();
            entries.sort();
            for entry in entries {
                let text = std::fs::read_to_string(&entry)?;
                suite.test_cases.push(test_case_from_xml(&text)?);
            }
        } else {
            let text = std::fs::read_to_string(path)?;
            suite.test_cases.push(test_case_from_xml(&text)?);
        }
        info!(count = suite.len(), "loaded test suite");
        Ok(suite)
    }

    /// Write one XML file per test case into `directory`, creating it
    pub fn store(&self, directory: &Path) -> Result<()> {
        std::fs::create_dir_all(directory)?;
        for (index, test_case) in self.test_cases.iter().enumerate() {
            let path = directory.join(format!("test_case_{}.xml", index));
            std::fs::write(&path, test_case_to_xml(test_case)?)?;
            debug!(path = %path.display(), "stored test case");
        }
        Ok(())
    }
}

pub fn test_case_to_xml(test_case: &TestCase) -> Result<String> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    writer
        .write_event(Event::Start(BytesStart::new("testcase")))
        .map_err(xml_error)?;

    if !test_case.initialization.is_empty() {
        writer
            .write_event(Event::Start(BytesStart::new("initialization")))
            .map_err(xml_error)?;
        write_valuations(&mut writer, &test_case.initialization)?;
        writer
            .write_event(Event::End(BytesEnd::new("initialization")))
            .map_err(xml_error)?;
    }

    for (cycle, valuations) in &test_case.inputs {
        let mut input = BytesStart::new("input");
        input.push_attribute(("cycle", cycle.to_string().as_str()));
        writer.write_event(Event::Start(input)).map_err(xml_error)?;
        write_valuations(&mut writer, valuations)?;
        writer
            .write_event(Event::End(BytesEnd::new("input")))
            .map_err(xml_error)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("testcase")))
        .map_err(xml_error)?;
    let bytes = writer.into_inner().into_inner();
    String::from_utf8(bytes).map_err(|e| AhornError::test_suite(e.to_string()))
}

fn write_valuations(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    valuations: &BTreeMap<String, Value>,
) -> Result<()> {
    for (variable, value) in valuations {
        let mut element = BytesStart::new("valuation");
        element.push_attribute(("variable", variable.as_str()));
        writer
            .write_event(Event::Start(element))
            .map_err(xml_error)?;
        writer
            .write_event(Event::Text(BytesText::new(&value.to_string())))
            .map_err(xml_error)?;
        writer
            .write_event(Event::End(BytesEnd::new("valuation")))
            .map_err(xml_error)?;
    }
    Ok(())
}

pub fn test_case_from_xml(text: &str) -> Result<TestCase> {
    let mut reader = Reader::from_str(text);

    let mut test_case = TestCase::default();
    enum Section {
        None,
        Initialization,
        Input(u32),
    }
    let mut section = Section::None;
    let mut variable: Option<String> = None;

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(element) => match element.name().as_ref() {
                b"testcase" => {}
                b"initialization" => section = Section::Initialization,
                b"input" => {
                    let mut cycle = None;
                    for attribute in element.attributes() {
                        let attribute = attribute.map_err(xml_error)?;
                        if attribute.key.as_ref() == b"cycle" {
                            let text = String::from_utf8_lossy(&attribute.value).to_string();
                            cycle = Some(text.parse::<u32>().map_err(|_| {
                                AhornError::test_suite(format!("bad cycle attribute {}", text))
                            })?);
                        }
                    }
                    let cycle = cycle.ok_or_else(|| {
                        AhornError::test_suite("input element without cycle attribute")
                    })?;
                    section = Section::Input(cycle);
                }
                b"valuation" => {
                    for attribute in element.attributes() {
                        let attribute = attribute.map_err(xml_error)?;
                        if attribute.key.as_ref() == b"variable" {
                            variable =
                                Some(String::from_utf8_lossy(&attribute.value).to_string());
                        }
                    }
                    if variable.is_none() {
                        return Err(AhornError::test_suite(
                            "valuation element without variable attribute",
                        ));
                    }
                }
                other => {
                    return Err(AhornError::test_suite(format!(
                        "unexpected element {}",
                        String::from_utf8_lossy(other)
                    )))
                }
            },
            Event::Text(text) => {
                let text = text.unescape().map_err(xml_error)?.to_string();
                if text.trim().is_empty() {
                    continue;
                }
                if let Some(name) = variable.take() {
                    let value = parse_value(&text)?;
                    match section {
                        Section::Initialization => {
                            test_case.initialization.insert(name, value);
                        }
                        Section::Input(cycle) => {
                            test_case.inputs.entry(cycle).or_default().insert(name, value);
                        }
                        Section::None => {
                            return Err(AhornError::test_suite(
                                "valuation outside initialization or input",
                            ))
                        }
                    }
                }
            }
            Event::Empty(element) => {
                if element.name().as_ref() == b"valuation" {
                    return Err(AhornError::test_suite("valuation element without value"));
                }
            }
            Event::End(element) => match element.name().as_ref() {
                b"initialization" | b"input" => section = Section::None,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(test_case)
}

fn parse_value(text: &str) -> Result<Value> {
    match text.trim() {
        "true" => Ok(Value::Bool(true)),
        "false" => Ok(Value::Bool(false)),
        number => number
            .parse::<i32>()
            .map(Value::Int)
            .map_err(|_| AhornError::test_suite(format!("bad valuation {}", number))),
    }
}

fn xml_error<E: std::fmt::Display>(error: E) -> AhornError {
    AhornError::test_suite(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let mut test_case = TestCase::default();
        test_case
            .initialization
            .insert("P.x".to_string(), Value::Int(0));
        test_case
            .inputs
            .entry(0)
            .or_default()
            .insert("P.a".to_string(), Value::Bool(true));
        test_case
            .inputs
            .entry(1)
            .or_default()
            .insert("P.a".to_string(), Value::Bool(false));

        let xml = test_case_to_xml(&test_case).unwrap();
        assert!(xml.contains("<testcase>"));
        assert!(xml.contains("variable=\"P.a\""));
        let parsed = test_case_from_xml(&xml).unwrap();
        assert!(parsed.same_stimulus(&test_case));
    }

    #[test]
    fn test_store_and_load_directory() {
        let directory = tempfile::tempdir().unwrap();
        let mut suite = TestSuite::new();
        let mut test_case = TestCase::default();
        test_case
            .inputs
            .entry(0)
            .or_default()
            .insert("P.a".to_string(), Value::Int(7));
        suite.push(test_case.clone());
        suite.store(directory.path()).unwrap();

        let loaded = TestSuite::load(directory.path()).unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.test_cases()[0].same_stimulus(&test_case));
    }

    #[test]
    fn test_duplicate_stimuli_are_not_pushed() {
        let mut suite = TestSuite::new();
        let mut test_case = TestCase::default();
        test_case
            .inputs
            .entry(0)
            .or_default()
            .insert("P.a".to_string(), Value::Int(7));
        suite.push(test_case.clone());
        suite.push(test_case);
        assert_eq!(suite.len(), 1);
    }
}
