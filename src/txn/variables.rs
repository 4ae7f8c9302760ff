use crate::core::errors::StrataError;
use crate::core::value::{DataType, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub data_type: DataType,
    pub constant: bool,
    pub value: Value,
}

/// Variables declared within one transaction. Names compare case-insensitively.
#[derive(Debug, Default)]
pub struct VariableManager {
    variables: Vec<Variable>,
}

impl VariableManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.variables
            .iter()
            .position(|v| v.name.eq_ignore_ascii_case(name))
    }

    fn check_type(name: &str, data_type: DataType, value: &Value) -> Result<(), StrataError> {
        if !value.fits(data_type) {
            return Err(StrataError::Evaluation(format!(
                "value {value} cannot be stored in variable '{name}' of type {data_type:?}"
            )));
        }
        Ok(())
    }

    pub fn declare(
        &mut self,
        name: impl Into<String>,
        data_type: DataType,
        constant: bool,
        value: Value,
    ) -> Result<(), StrataError> {
        let name = name.into();
        if self.position(&name).is_some() {
            return Err(StrataError::DuplicateVariable(name));
        }
        Self::check_type(&name, data_type, &value)?;
        self.variables.push(Variable {
            name,
            data_type,
            constant,
            value,
        });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&Variable, StrataError> {
        self.position(name)
            .map(|i| &self.variables[i])
            .ok_or_else(|| StrataError::VariableNotFound(name.to_string()))
    }

    pub fn assign(&mut self, name: &str, value: Value) -> Result<(), StrataError> {
        let i = self
            .position(name)
            .ok_or_else(|| StrataError::VariableNotFound(name.to_string()))?;
        let variable = &mut self.variables[i];
        if variable.constant {
            return Err(StrataError::ConstantVariable(variable.name.clone()));
        }
        Self::check_type(&variable.name, variable.data_type, &value)?;
        variable.value = value;
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<(), StrataError> {
        let i = self
            .position(name)
            .ok_or_else(|| StrataError::VariableNotFound(name.to_string()))?;
        self.variables.remove(i);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn clear(&mut self) {
        self.variables.clear();
    }
}
