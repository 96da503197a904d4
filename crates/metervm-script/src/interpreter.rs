//! Interpreter for parsed scripts.
//!
//! Integers in state are stored as 8-byte little-endian `i64`. Model and
//! tensor instructions are priced by the estimators and admitted by the
//! run's charge meter before they take effect.

use metervm_core::{
    ChargeAmount, Execution, IoStatus, ModelEstimator, RunContext, TensorEstimator, Value,
};

use crate::parser::{Entry, Instruction, Operand, ReturnValue};

/// Per-run interpreter state.
pub(crate) struct Machine<'e, 'c, 'a> {
    entry: &'e Entry,
    params: &'e [Value],
    ctx: &'c mut RunContext<'a>,
    model: ModelEstimator,
    tensor: Option<TensorEstimator>,
}

impl<'e, 'c, 'a> Machine<'e, 'c, 'a> {
    pub(crate) fn new(entry: &'e Entry, params: &'e [Value], ctx: &'c mut RunContext<'a>) -> Self {
        Self {
            entry,
            params,
            ctx,
            model: ModelEstimator::new(),
            tensor: None,
        }
    }

    pub(crate) fn run(mut self) -> Execution {
        if self.params.len() != self.entry.params.len() {
            return Execution::failure(format!(
                "{} expects {} arguments, got {}",
                self.entry.name,
                self.entry.params.len(),
                self.params.len()
            ));
        }

        for statement in &self.entry.body {
            match self.step(&statement.instruction) {
                Ok(Flow::Next) => {}
                Ok(Flow::Return(value)) => return Execution::success(value),
                Err(message) => {
                    return Execution::failure(format!(
                        "{}:{}: {}",
                        self.entry.file, statement.line, message
                    ));
                }
            }
        }

        Execution::success(Value::Unit)
    }

    fn step(&mut self, instruction: &Instruction) -> Result<Flow, String> {
        match instruction {
            Instruction::Print(text) => self.ctx.stdout.push_str(text),
            Instruction::Println(text) => {
                self.ctx.stdout.push_str(text);
                self.ctx.stdout.push('\n');
            }
            Instruction::Set { key, value } => {
                let value = self.integer(value)?;
                self.store(key, value)?;
            }
            Instruction::Add { key, value } => {
                let delta = self.integer(value)?;
                let current = self.load(key)?.unwrap_or(0);
                let sum = current
                    .checked_add(delta)
                    .ok_or_else(|| format!("integer overflow adding {} to `{}`", delta, key))?;
                self.store(key, sum)?;
            }
            Instruction::Show(key) => {
                let value = self.require(key)?;
                self.ctx.stdout.push_str(&format!("{} = {}\n", key, value));
            }
            Instruction::Require(key) => {
                self.require(key)?;
            }
            Instruction::Fail(text) => return Err(text.clone()),
            Instruction::Return(value) => return self.return_value(value).map(Flow::Return),
            Instruction::TensorFill(size) => {
                let size = self.count(size)?;
                let tensor = TensorEstimator::new(vec![size]);
                self.admit("tensor.fill", tensor.fill())?;
                self.tensor = Some(tensor);
            }
            Instruction::TensorReshape(size) => {
                let size = self.count(size)?;
                let tensor = self
                    .tensor
                    .as_ref()
                    .ok_or_else(|| "no tensor to reshape".to_string())?;
                if tensor.element_count() != size {
                    return Err(format!(
                        "cannot reshape {} elements into {}",
                        tensor.element_count(),
                        size
                    ));
                }
                let charge = tensor.reshape(&[size]);
                self.admit("tensor.reshape", charge)?;
                self.tensor = Some(TensorEstimator::new(vec![size]));
            }
            Instruction::ModelDense {
                inputs,
                outputs,
                relu,
            } => {
                let (inputs, outputs) = (self.count(inputs)?, self.count(outputs)?);
                let charge = if *relu {
                    self.model
                        .layer_add_dense_activation("dense", inputs, outputs, "relu")
                } else {
                    self.model.layer_add_dense("dense", inputs, outputs)
                };
                self.admit("model.dense", charge)?;
            }
            Instruction::ModelConv {
                output_channels,
                input_channels,
                kernel,
                stride,
            } => {
                let (output_channels, input_channels) =
                    (self.count(output_channels)?, self.count(input_channels)?);
                let (kernel, stride) = (self.count(kernel)?, self.count(stride)?);
                let charge = self.model.layer_add_conv(
                    "conv1d",
                    output_channels,
                    input_channels,
                    kernel,
                    stride,
                );
                self.admit("model.conv", charge)?;
            }
            Instruction::ModelCompile { loss, optimiser } => {
                let charge = self.model.compile_sequential(loss, optimiser);
                self.admit("model.compile", charge)?;
            }
            Instruction::ModelFit { rows, batch } => {
                let (rows, batch) = (self.count(rows)?, self.count(batch)?);
                let charge = self.model.fit(&[1, rows], &[1, rows], batch);
                self.admit("model.fit", charge)?;
            }
            Instruction::ModelPredict { rows } => {
                let rows = self.count(rows)?;
                let charge = self.model.predict(&[1, rows]);
                self.admit("model.predict", charge)?;
            }
        }
        Ok(Flow::Next)
    }

    fn admit(&mut self, operation: &str, charge: ChargeAmount) -> Result<(), String> {
        self.ctx
            .meter
            .admit(operation, charge)
            .map_err(|refusal| refusal.to_string())
    }

    fn integer(&self, operand: &Operand) -> Result<i64, String> {
        match operand {
            Operand::Literal(v) => Ok(*v),
            Operand::Param(index) => {
                let param = &self.entry.params[*index];
                let value = &self.params[*index];
                match value {
                    Value::Bool(b) => Ok(i64::from(*b)),
                    other => other
                        .as_integer()
                        .and_then(|v| i64::try_from(v).ok())
                        .ok_or_else(|| format!("`${}` is not an integer", param.name)),
                }
            }
        }
    }

    fn count(&self, operand: &Operand) -> Result<u64, String> {
        let value = self.integer(operand)?;
        u64::try_from(value).map_err(|_| format!("expected a non-negative size, found {}", value))
    }

    fn load(&self, key: &str) -> Result<Option<i64>, String> {
        let mut buffer = [0u8; 8];
        let mut size = buffer.len() as u64;
        match self.ctx.io.read(key, &mut buffer, &mut size) {
            IoStatus::Ok if size == 8 => Ok(Some(i64::from_le_bytes(buffer))),
            IoStatus::Ok | IoStatus::BufferTooSmall => {
                Err(format!("`{}` holds {} bytes, not an integer", key, size))
            }
            IoStatus::PermissionDenied => Ok(None),
        }
    }

    fn require(&self, key: &str) -> Result<i64, String> {
        self.load(key)?
            .ok_or_else(|| format!("state has no value for `{}`", key))
    }

    fn store(&mut self, key: &str, value: i64) -> Result<(), String> {
        match self.ctx.io.write(key, &value.to_le_bytes()) {
            IoStatus::Ok => Ok(()),
            status => Err(format!("write to `{}` failed: {:?}", key, status)),
        }
    }

    fn return_value(&self, value: &ReturnValue) -> Result<Value, String> {
        Ok(match value {
            ReturnValue::Int(v) => Value::Int64(*v),
            ReturnValue::Float(v) => Value::Float64(*v),
            ReturnValue::Bool(v) => Value::Bool(*v),
            ReturnValue::Param(index) => self.params[*index].clone(),
            ReturnValue::Key(key) => Value::Int64(self.require(key)?),
        })
    }
}

enum Flow {
    Next,
    Return(Value),
}
