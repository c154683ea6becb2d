//! In-memory program representation and the check profiles applied to it
//! after parsing.

use anyhow::{Result, bail};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;

use super::kernels::InstructionSet;
use crate::error::FlError;

/// Built-in instruction that transfers control to another function.
pub const CALL_INSTRUCTION: &str = "call";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub instructions: Vec<Instruction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// Usually the source file stem.
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub defines: Vec<String>,
    pub functions: Vec<Function>,
}

impl Program {
    pub const ENTRY_POINT: &'static str = "Main";

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn entry_point(&self) -> Result<&Function, FlError> {
        self.function(Self::ENTRY_POINT)
            .ok_or_else(|| FlError::MissingEntryPoint {
                program: self.name.clone(),
                entry: Self::ENTRY_POINT.to_string(),
            })
    }

    /// Names of all functions reachable from the entry point through `call`.
    pub fn reachable_functions(&self) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![Self::ENTRY_POINT.to_string()];
        while let Some(name) = stack.pop() {
            let Some(function) = self.function(&name) else {
                continue;
            };
            if !seen.insert(name) {
                continue;
            }
            for instruction in &function.instructions {
                if instruction.name == CALL_INSTRUCTION {
                    stack.extend(instruction.args.iter().cloned());
                }
            }
        }
        seen
    }

    /// Drop every function that cannot be reached from the entry point.
    /// Programs without an entry point are left untouched.
    pub fn prune_unreachable(&mut self) -> usize {
        if self.function(Self::ENTRY_POINT).is_none() {
            return 0;
        }
        let reachable = self.reachable_functions();
        let before = self.functions.len();
        self.functions.retain(|f| reachable.contains(&f.name));
        before - self.functions.len()
    }
}

/// Which checks run on every parsed program (`--checks`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckProfile {
    /// No checks
    None,
    /// Reject unknown instructions, dangling calls and duplicate functions
    #[default]
    InputValidation,
    /// Remove functions unreachable from the entry point
    Optimizations,
    /// Input validation followed by optimizations
    All,
}

impl fmt::Display for CheckProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckProfile::None => write!(f, "none"),
            CheckProfile::InputValidation => write!(f, "input-validation"),
            CheckProfile::Optimizations => write!(f, "optimizations"),
            CheckProfile::All => write!(f, "all"),
        }
    }
}

/// A single pass over a parsed program.
pub trait ProgramCheck: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this check needs a populated instruction set to work.
    fn needs_instructions(&self) -> bool {
        false
    }

    fn apply(&self, program: &mut Program, instructions: &InstructionSet) -> Result<()>;
}

struct InputValidation;

impl ProgramCheck for InputValidation {
    fn name(&self) -> &'static str {
        "input-validation"
    }

    fn needs_instructions(&self) -> bool {
        true
    }

    fn apply(&self, program: &mut Program, instructions: &InstructionSet) -> Result<()> {
        let mut names = HashSet::new();
        for function in &program.functions {
            if !names.insert(function.name.as_str()) {
                bail!(
                    "Function '{}' is defined more than once in {}",
                    function.name,
                    program.name
                );
            }
        }

        for function in &program.functions {
            for instruction in &function.instructions {
                if instruction.name == CALL_INSTRUCTION {
                    match instruction.args.as_slice() {
                        [target] if names.contains(target.as_str()) => {}
                        [target] => bail!(
                            "Function '{}' calls undefined function '{target}'",
                            function.name
                        ),
                        _ => bail!(
                            "'{CALL_INSTRUCTION}' in function '{}' takes exactly one argument",
                            function.name
                        ),
                    }
                } else if !instructions.contains(&instruction.name) {
                    return Err(FlError::UnknownInstruction {
                        name: instruction.name.clone(),
                        function: function.name.clone(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }
}

struct PruneUnreachable;

impl ProgramCheck for PruneUnreachable {
    fn name(&self) -> &'static str {
        "prune-unreachable"
    }

    fn apply(&self, program: &mut Program, _instructions: &InstructionSet) -> Result<()> {
        let removed = program.prune_unreachable();
        if removed > 0 {
            tracing::debug!(program = %program.name, removed, "Pruned unreachable functions");
        }
        Ok(())
    }
}

impl CheckProfile {
    /// Build the checks for this profile against an instruction set.
    ///
    /// Fails when a check cannot work with the given instruction set, which
    /// makes the whole batch invalid.
    pub fn attach(self, instructions: &InstructionSet) -> Result<Vec<Box<dyn ProgramCheck>>, FlError> {
        let checks: Vec<Box<dyn ProgramCheck>> = match self {
            CheckProfile::None => Vec::new(),
            CheckProfile::InputValidation => vec![Box::new(InputValidation)],
            CheckProfile::Optimizations => vec![Box::new(PruneUnreachable)],
            CheckProfile::All => vec![Box::new(InputValidation), Box::new(PruneUnreachable)],
        };

        if let Some(check) = checks
            .iter()
            .find(|c| c.needs_instructions() && instructions.is_empty())
        {
            return Err(FlError::InvalidCheckProfile {
                profile: self.to_string(),
                reason: format!("check '{}' needs a non-empty instruction set", check.name()),
            });
        }
        Ok(checks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instr(name: &str, args: &[&str]) -> Instruction {
        Instruction {
            name: name.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn program(functions: Vec<(&str, Vec<Instruction>)>) -> Program {
        Program {
            name: "test".into(),
            defines: Vec::new(),
            functions: functions
                .into_iter()
                .map(|(name, instructions)| Function {
                    name: name.into(),
                    instructions,
                })
                .collect(),
        }
    }

    fn iset() -> InstructionSet {
        InstructionSet::from_names(["set_v", "invert"])
    }

    #[test]
    fn missing_entry_point_is_reported() {
        let p = program(vec![("Other", vec![])]);
        assert!(matches!(
            p.entry_point(),
            Err(FlError::MissingEntryPoint { .. })
        ));
    }

    #[test]
    fn input_validation_rejects_unknown_instruction() {
        let mut p = program(vec![("Main", vec![instr("blur", &[])])]);
        let checks = CheckProfile::InputValidation.attach(&iset()).unwrap();
        let err = checks[0].apply(&mut p, &iset()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FlError>(),
            Some(FlError::UnknownInstruction { .. })
        ));
    }

    #[test]
    fn input_validation_rejects_dangling_call() {
        let mut p = program(vec![("Main", vec![instr("call", &["Nope"])])]);
        let checks = CheckProfile::InputValidation.attach(&iset()).unwrap();
        assert!(checks[0].apply(&mut p, &iset()).is_err());
    }

    #[test]
    fn optimizations_prune_unreachable_functions() {
        let mut p = program(vec![
            ("Main", vec![instr("call", &["Used"])]),
            ("Used", vec![instr("invert", &[])]),
            ("Unused", vec![instr("invert", &[])]),
        ]);
        for check in CheckProfile::All.attach(&iset()).unwrap() {
            check.apply(&mut p, &iset()).unwrap();
        }
        let names: Vec<_> = p.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Main", "Used"]);
    }

    #[test]
    fn validation_profile_cannot_attach_to_empty_instruction_set() {
        let empty = InstructionSet::default();
        assert!(matches!(
            CheckProfile::InputValidation.attach(&empty),
            Err(FlError::InvalidCheckProfile { .. })
        ));
        assert!(CheckProfile::None.attach(&empty).unwrap().is_empty());
    }
}
