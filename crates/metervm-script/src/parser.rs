//! Parser for metervm script sources.
//!
//! Sources are line oriented. Each entrypoint is a block:
//!
//! ```text
//! # comment
//! entry main(count: i64, verbose: bool)
//!     println starting
//!     add counter $count
//!     return @counter
//! end
//! ```
//!
//! Every problem found is reported as a `file:line: message` diagnostic and
//! parsing continues, so one compile reports all errors at once.

use metervm_core::{SourceFile, ValueType};
use rustc_hash::FxHashMap;

/// A compiled script.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub(crate) entries: FxHashMap<String, Entry>,
}

impl Program {
    pub fn entry(&self, name: &str) -> Option<&Entry> {
        self.entries.get(name)
    }

    /// Entrypoint names, sorted.
    pub fn entry_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub name: String,
    pub file: String,
    pub params: Vec<Param>,
    pub body: Vec<Statement>,
}

impl Entry {
    pub fn parameter_types(&self) -> Vec<ValueType> {
        self.params.iter().map(|p| p.ty).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: ValueType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub line: usize,
    pub instruction: Instruction,
}

/// An integer argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(i64),
    /// Index into the entry's parameters.
    Param(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReturnValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Param(usize),
    /// Integer stored in state under this key.
    Key(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Print(String),
    Println(String),
    Set { key: String, value: Operand },
    Add { key: String, value: Operand },
    Show(String),
    Require(String),
    Fail(String),
    Return(ReturnValue),
    TensorFill(Operand),
    TensorReshape(Operand),
    ModelDense { inputs: Operand, outputs: Operand, relu: bool },
    ModelConv {
        output_channels: Operand,
        input_channels: Operand,
        kernel: Operand,
        stride: Operand,
    },
    ModelCompile { loss: String, optimiser: String },
    ModelFit { rows: Operand, batch: Operand },
    ModelPredict { rows: Operand },
}

/// Parse all `sources` into one program.
pub fn parse(sources: &[SourceFile]) -> Result<Program, Vec<String>> {
    let mut diagnostics = Vec::new();
    let mut entries: FxHashMap<String, Entry> = FxHashMap::default();

    for source in sources {
        for entry in parse_file(source, &mut diagnostics) {
            if entries.contains_key(&entry.name) {
                diagnostics.push(format!(
                    "{}: duplicate entrypoint `{}`",
                    source.name, entry.name
                ));
                continue;
            }
            entries.insert(entry.name.clone(), entry);
        }
    }

    if diagnostics.is_empty() {
        Ok(Program { entries })
    } else {
        Err(diagnostics)
    }
}

struct Open {
    entry: Entry,
    line: usize,
}

fn parse_file(source: &SourceFile, diagnostics: &mut Vec<String>) -> Vec<Entry> {
    let mut entries = Vec::new();
    let mut open: Option<Open> = None;

    for (index, raw) in source.text.lines().enumerate() {
        let line = index + 1;
        let text = raw.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }

        let mut report = |message: String| {
            diagnostics.push(format!("{}:{}: {}", source.name, line, message));
        };

        let (word, rest) = split_word(text);
        match word {
            "entry" => {
                if let Some(current) = &open {
                    report(format!(
                        "entry inside entry `{}` opened at line {}",
                        current.entry.name, current.line
                    ));
                    continue;
                }
                match parse_header(rest) {
                    Ok((name, params)) => {
                        open = Some(Open {
                            entry: Entry {
                                name,
                                file: source.name.clone(),
                                params,
                                body: Vec::new(),
                            },
                            line,
                        });
                    }
                    Err(message) => report(message),
                }
            }
            "end" => match open.take() {
                Some(current) => entries.push(current.entry),
                None => report("`end` without entry".to_string()),
            },
            _ => match &mut open {
                Some(current) => match parse_instruction(word, rest, &current.entry.params) {
                    Ok(instruction) => current.entry.body.push(Statement { line, instruction }),
                    Err(message) => report(message),
                },
                None => report(format!("`{}` outside of an entry", word)),
            },
        }
    }

    if let Some(current) = open {
        diagnostics.push(format!(
            "{}:{}: entry `{}` is never closed",
            source.name, current.line, current.entry.name
        ));
    }

    entries
}

fn split_word(text: &str) -> (&str, &str) {
    match text.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (text, ""),
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// `name(a: i32, b: bool)`
fn parse_header(text: &str) -> Result<(String, Vec<Param>), String> {
    let (name, params) = text
        .split_once('(')
        .ok_or_else(|| format!("malformed entry header `{}`", text))?;
    let params = params
        .trim_end()
        .strip_suffix(')')
        .ok_or_else(|| format!("malformed entry header `{}`", text))?;

    let name = name.trim();
    if !is_identifier(name) {
        return Err(format!("invalid entry name `{}`", name));
    }

    let mut parsed: Vec<Param> = Vec::new();
    for part in params.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (param, ty) = part
            .split_once(':')
            .ok_or_else(|| format!("parameter `{}` has no type", part))?;
        let param = param.trim();
        if !is_identifier(param) {
            return Err(format!("invalid parameter name `{}`", param));
        }
        if parsed.iter().any(|p| p.name == param) {
            return Err(format!("duplicate parameter `{}`", param));
        }
        let ty = ty.trim().parse::<ValueType>()?;
        if ty == ValueType::Unit {
            return Err(format!("parameter `{}` cannot be unit", param));
        }
        parsed.push(Param {
            name: param.to_string(),
            ty,
        });
    }

    Ok((name.to_string(), parsed))
}

fn param_index(name: &str, params: &[Param]) -> Result<usize, String> {
    params
        .iter()
        .position(|p| p.name == name)
        .ok_or_else(|| format!("unknown parameter `${}`", name))
}

fn operand(text: &str, params: &[Param]) -> Result<Operand, String> {
    if let Some(name) = text.strip_prefix('$') {
        return param_index(name, params).map(Operand::Param);
    }
    text.parse::<i64>()
        .map(Operand::Literal)
        .map_err(|_| format!("expected integer, found `{}`", text))
}

fn key(text: &str) -> Result<String, String> {
    if text.is_empty() || text.contains(char::is_whitespace) {
        return Err(format!("expected a single key, found `{}`", text));
    }
    Ok(text.to_string())
}

fn arguments<'a, const N: usize>(instruction: &str, text: &'a str) -> Result<[&'a str; N], String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    words.try_into().map_err(|words: Vec<&str>| {
        format!(
            "`{}` takes {} arguments, found {}",
            instruction,
            N,
            words.len()
        )
    })
}

fn return_value(text: &str, params: &[Param]) -> Result<ReturnValue, String> {
    if let Some(name) = text.strip_prefix('$') {
        return param_index(name, params).map(ReturnValue::Param);
    }
    if let Some(key_name) = text.strip_prefix('@') {
        return key(key_name).map(ReturnValue::Key);
    }
    match text {
        "true" => return Ok(ReturnValue::Bool(true)),
        "false" => return Ok(ReturnValue::Bool(false)),
        _ => {}
    }
    if let Ok(v) = text.parse::<i64>() {
        return Ok(ReturnValue::Int(v));
    }
    text.parse::<f64>()
        .map(ReturnValue::Float)
        .map_err(|_| format!("cannot return `{}`", text))
}

fn parse_instruction(word: &str, rest: &str, params: &[Param]) -> Result<Instruction, String> {
    let instruction = match word {
        "print" => Instruction::Print(rest.to_string()),
        "println" => Instruction::Println(rest.to_string()),
        "set" | "add" => {
            let [k, v] = arguments::<2>(word, rest)?;
            let (key, value) = (key(k)?, operand(v, params)?);
            if word == "set" {
                Instruction::Set { key, value }
            } else {
                Instruction::Add { key, value }
            }
        }
        "show" => Instruction::Show(key(rest)?),
        "require" => Instruction::Require(key(rest)?),
        "fail" => Instruction::Fail(rest.to_string()),
        "return" => Instruction::Return(return_value(rest, params)?),
        "tensor.fill" => {
            let [n] = arguments::<1>(word, rest)?;
            Instruction::TensorFill(operand(n, params)?)
        }
        "tensor.reshape" => {
            let [n] = arguments::<1>(word, rest)?;
            Instruction::TensorReshape(operand(n, params)?)
        }
        "model.dense" | "model.dense_relu" => {
            let [i, o] = arguments::<2>(word, rest)?;
            Instruction::ModelDense {
                inputs: operand(i, params)?,
                outputs: operand(o, params)?,
                relu: word == "model.dense_relu",
            }
        }
        "model.conv" => {
            let [o, i, k, s] = arguments::<4>(word, rest)?;
            Instruction::ModelConv {
                output_channels: operand(o, params)?,
                input_channels: operand(i, params)?,
                kernel: operand(k, params)?,
                stride: operand(s, params)?,
            }
        }
        "model.compile" => {
            let [loss, optimiser] = arguments::<2>(word, rest)?;
            Instruction::ModelCompile {
                loss: loss.to_string(),
                optimiser: optimiser.to_string(),
            }
        }
        "model.fit" => {
            let [rows, batch] = arguments::<2>(word, rest)?;
            Instruction::ModelFit {
                rows: operand(rows, params)?,
                batch: operand(batch, params)?,
            }
        }
        "model.predict" => {
            let [rows] = arguments::<1>(word, rest)?;
            Instruction::ModelPredict {
                rows: operand(rows, params)?,
            }
        }
        other => return Err(format!("unknown instruction `{}`", other)),
    };
    Ok(instruction)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(text: &str) -> Vec<SourceFile> {
        vec![SourceFile::new("main.mvs", text)]
    }

    #[test]
    fn test_parse_entry() {
        let program = parse(&source(concat!(
            "# greeting\nentry main(n: i32, loud: bool)\n",
            "  print Hello world!!\n  add total $n\n  return @total\nend\n",
        )))
        .unwrap();

        let entry = program.entry("main").unwrap();
        assert_eq!(entry.parameter_types(), vec![ValueType::Int32, ValueType::Bool]);
        assert_eq!(entry.body.len(), 3);
        assert_eq!(
            entry.body[0],
            Statement {
                line: 3,
                instruction: Instruction::Print("Hello world!!".to_string())
            }
        );
        assert_eq!(
            entry.body[1].instruction,
            Instruction::Add {
                key: "total".to_string(),
                value: Operand::Param(0)
            }
        );
        assert_eq!(
            entry.body[2].instruction,
            Instruction::Return(ReturnValue::Key("total".to_string()))
        );
    }

    #[test]
    fn test_multiple_entries_and_files() {
        let program = parse(&[
            SourceFile::new("a.mvs", "entry main()\nend\nentry helper()\nend"),
            SourceFile::new("b.mvs", "entry other()\n  model.dense 4 8\nend"),
        ])
        .unwrap();
        assert_eq!(program.entry_names(), vec!["helper", "main", "other"]);
        assert_eq!(program.entry("other").unwrap().file, "b.mvs");
    }

    #[test]
    fn test_all_errors_reported() {
        let diagnostics = parse(&source(concat!(
            "print outside\nentry main(x: i32)\n",
            "  jump 3\n  set k $y\n  set k\n  model.dense 1 two\n",
        )))
        .unwrap_err();

        assert_eq!(
            diagnostics,
            vec![
                "main.mvs:1: `print` outside of an entry",
                "main.mvs:3: unknown instruction `jump`",
                "main.mvs:4: unknown parameter `$y`",
                "main.mvs:5: `set` takes 2 arguments, found 1",
                "main.mvs:6: expected integer, found `two`",
                "main.mvs:2: entry `main` is never closed",
            ]
        );
    }

    #[test]
    fn test_header_errors() {
        let diagnostics = parse(&source(
            "entry main\nentry 1st()\nentry f(a: int)\nentry g(a: i32, a: i32)\nend\n",
        ))
        .unwrap_err();
        assert_eq!(diagnostics.len(), 5);
        assert!(diagnostics[0].contains("malformed entry header"));
        assert!(diagnostics[1].contains("invalid entry name"));
        assert!(diagnostics[2].contains("unknown type `int`"));
        assert!(diagnostics[3].contains("duplicate parameter"));
        assert_eq!(diagnostics[4], "main.mvs:5: `end` without entry");
    }

    #[test]
    fn test_duplicate_entry_across_files() {
        let diagnostics = parse(&[
            SourceFile::new("a.mvs", "entry main()\nend"),
            SourceFile::new("b.mvs", "entry main()\nend"),
        ])
        .unwrap_err();
        assert_eq!(diagnostics, vec!["b.mvs: duplicate entrypoint `main`"]);
    }

    #[test]
    fn test_return_values() {
        let params = vec![Param {
            name: "p".to_string(),
            ty: ValueType::Float64,
        }];
        assert_eq!(return_value("3", &params), Ok(ReturnValue::Int(3)));
        assert_eq!(return_value("2.5", &params), Ok(ReturnValue::Float(2.5)));
        assert_eq!(return_value("false", &params), Ok(ReturnValue::Bool(false)));
        assert_eq!(return_value("$p", &params), Ok(ReturnValue::Param(0)));
        assert!(return_value("soon", &params).is_err());
    }
}
