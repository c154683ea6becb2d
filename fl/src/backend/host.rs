//! CPU reference backend.
//!
//! Source format understood by [`HostParser`]:
//!
//! ```text
//! # comment
//! Main:
//!     set_v 0.5
//!     ?NOISE urnd          # only when NOISE is among the defines
//!     call Finish
//! Finish:
//!     invert
//! ```
//!
//! [`HostDevice`] evaluates the kernels below directly on RGBA8 pixels.
//! A kernel file compiles when its braces and parentheses balance; every
//! `__kernel void <name>(` declaration contributes one kernel.

use anyhow::{Context, Result, anyhow, bail};
use image::RgbaImage;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::trace;

use super::kernels::InstructionSet;
use super::program::{CALL_INSTRUCTION, CheckProfile, Function, Instruction, Program, ProgramCheck};
use super::{ComputeDevice, DeviceBuffer, ProgramParser};
use crate::error::FlError;

const MAX_CALL_DEPTH: usize = 64;

pub struct HostParser {
    instructions: Arc<InstructionSet>,
    checks: Vec<Box<dyn ProgramCheck>>,
}

impl HostParser {
    /// Create a parser with the checks of `profile` attached.
    pub fn new(instructions: Arc<InstructionSet>, profile: CheckProfile) -> Result<Self, FlError> {
        let checks = profile.attach(&instructions)?;
        Ok(Self {
            instructions,
            checks,
        })
    }

    pub fn parse_source(&self, name: &str, source: &str, defines: &[String]) -> Result<Program> {
        let mut functions: Vec<Function> = Vec::new();

        for (index, raw) in source.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }

            if let Some(label) = line.strip_suffix(':') {
                let label = label.trim();
                if label.is_empty() || !label.chars().all(|c| c.is_alphanumeric() || c == '_') {
                    bail!("{name}:{line_no}: invalid function name '{label}'");
                }
                functions.push(Function {
                    name: label.to_string(),
                    instructions: Vec::new(),
                });
                continue;
            }

            let line = match line.strip_prefix('?') {
                Some(guarded) => {
                    let (tag, rest) = guarded.split_once(char::is_whitespace).ok_or_else(|| {
                        anyhow!("{name}:{line_no}: conditional line has no instruction")
                    })?;
                    if !defines.iter().any(|d| d == tag) {
                        continue;
                    }
                    rest.trim()
                }
                None => line,
            };

            let mut parts = line.split_whitespace();
            let Some(op) = parts.next() else {
                continue;
            };
            let Some(current) = functions.last_mut() else {
                bail!("{name}:{line_no}: instruction '{op}' outside of a function");
            };
            current.instructions.push(Instruction {
                name: op.to_string(),
                args: parts.map(str::to_string).collect(),
            });
        }

        let mut program = Program {
            name: name.to_string(),
            defines: defines.to_vec(),
            functions,
        };
        for check in &self.checks {
            check
                .apply(&mut program, &self.instructions)
                .with_context(|| format!("Check '{}' failed for {name}", check.name()))?;
        }
        Ok(program)
    }
}

impl ProgramParser for HostParser {
    fn parse(&self, path: &Path, defines: &[String]) -> Result<Program> {
        let source = fs::read_to_string(path)
            .with_context(|| format!("Failed to read program {}", path.display()))?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.parse_source(&name, &source, defines)
    }
}

/// Evaluates programs on the CPU.
#[derive(Debug, Default)]
pub struct HostDevice;

impl HostDevice {
    pub fn new() -> Self {
        Self
    }
}

impl ComputeDevice for HostDevice {
    fn name(&self) -> &str {
        "host"
    }

    fn compile_kernels(&self, path: &Path, source: &str) -> Result<Vec<String>> {
        let mut depth_brace = 0i64;
        let mut depth_paren = 0i64;
        for c in source.chars() {
            match c {
                '{' => depth_brace += 1,
                '}' => depth_brace -= 1,
                '(' => depth_paren += 1,
                ')' => depth_paren -= 1,
                _ => {}
            }
            if depth_brace < 0 || depth_paren < 0 {
                break;
            }
        }
        if depth_brace != 0 || depth_paren != 0 {
            bail!("{}: unbalanced braces or parentheses", path.display());
        }

        let mut names = Vec::new();
        let mut rest = source;
        while let Some(pos) = rest.find("__kernel") {
            rest = &rest[pos + "__kernel".len()..];
            let decl = rest.trim_start();
            let Some(after_void) = decl.strip_prefix("void") else {
                bail!("{}: kernel must return void", path.display());
            };
            let name: String = after_void
                .trim_start()
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_')
                .collect();
            if name.is_empty() {
                bail!("{}: kernel without a name", path.display());
            }
            names.push(name);
        }
        Ok(names)
    }

    fn allocate(&self, label: &str, width: u32, height: u32) -> Result<DeviceBuffer> {
        Ok(DeviceBuffer::zeroed(label, width, height)?)
    }

    fn execute(
        &self,
        program: &Program,
        instructions: &InstructionSet,
        input: &DeviceBuffer,
        warm: bool,
    ) -> Result<DeviceBuffer> {
        let entry = program.entry_point()?;

        let mut pixels = input
            .with_pixels(<[u8]>::to_vec)
            .ok_or_else(|| anyhow!("Input buffer '{}' was released", input.label()))?;
        if warm {
            trace!(program = %program.name, "Warming buffers");
            pixels.fill(0);
        }

        let mut state = Evaluator {
            program,
            instructions,
            width: input.width(),
            height: input.height(),
            pixels,
            noise_counter: 0,
        };
        state.run(entry, 0)?;

        Ok(DeviceBuffer::new(
            "Output",
            state.width,
            state.height,
            state.pixels,
        ))
    }

    fn read_back(&self, buffer: &DeviceBuffer) -> Result<RgbaImage> {
        let pixels = buffer
            .with_pixels(<[u8]>::to_vec)
            .ok_or_else(|| anyhow!("Buffer '{}' was released", buffer.label()))?;
        RgbaImage::from_raw(buffer.width(), buffer.height(), pixels)
            .ok_or_else(|| anyhow!("Buffer '{}' has an invalid size", buffer.label()))
    }
}

struct Evaluator<'a> {
    program: &'a Program,
    instructions: &'a InstructionSet,
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    noise_counter: u32,
}

impl Evaluator<'_> {
    fn run(&mut self, function: &Function, depth: usize) -> Result<()> {
        if depth > MAX_CALL_DEPTH {
            bail!("Call depth exceeded in function '{}'", function.name);
        }
        let program = self.program;
        for instruction in &function.instructions {
            if instruction.name == CALL_INSTRUCTION {
                let target = instruction
                    .args
                    .first()
                    .and_then(|name| program.function(name))
                    .ok_or_else(|| {
                        anyhow!("Invalid call in function '{}'", function.name)
                    })?;
                self.run(target, depth + 1)?;
                continue;
            }
            if !self.instructions.contains(&instruction.name) {
                return Err(FlError::UnknownInstruction {
                    name: instruction.name.clone(),
                    function: function.name.clone(),
                }
                .into());
            }
            self.apply(instruction)
                .with_context(|| format!("In function '{}'", function.name))?;
        }
        Ok(())
    }

    fn apply(&mut self, instruction: &Instruction) -> Result<()> {
        let args = &instruction.args;
        match instruction.name.as_str() {
            "set_v" => {
                let v = to_byte(arg(args, 0)?);
                self.pixels.fill(v);
            }
            "set_color" => {
                let rgba = [
                    to_byte(arg(args, 0)?),
                    to_byte(arg(args, 1)?),
                    to_byte(arg(args, 2)?),
                    to_byte(arg(args, 3)?),
                ];
                for px in self.pixels.chunks_exact_mut(4) {
                    px.copy_from_slice(&rgba);
                }
            }
            "add_v" => {
                let v = arg(args, 0)?;
                self.map_rgb(|c| to_byte(c as f32 / 255.0 + v));
            }
            "mul_v" => {
                let v = arg(args, 0)?;
                self.map_rgb(|c| to_byte(c as f32 / 255.0 * v));
            }
            "invert" => self.map_rgb(|c| 255 - c),
            "gradient_x" | "gradient_y" => {
                let horizontal = instruction.name == "gradient_x";
                let (w, h) = (self.width.max(2) - 1, self.height.max(2) - 1);
                for (i, px) in self.pixels.chunks_exact_mut(4).enumerate() {
                    let x = i as u32 % self.width;
                    let y = i as u32 / self.width;
                    let v = if horizontal {
                        x as f32 / w as f32
                    } else {
                        y as f32 / h as f32
                    };
                    let b = to_byte(v);
                    px[..3].fill(b);
                    px[3] = 255;
                }
            }
            "urnd" => {
                self.noise_counter = self.noise_counter.wrapping_add(1);
                let seed = self.noise_counter;
                for (i, px) in self.pixels.chunks_exact_mut(4).enumerate() {
                    let b = (xorshift(seed.wrapping_mul(0x9E37_79B9) ^ i as u32) >> 24) as u8;
                    px[..3].fill(b);
                    px[3] = 255;
                }
            }
            other => bail!("Kernel '{other}' is not implemented by the host device"),
        }
        Ok(())
    }

    fn map_rgb(&mut self, f: impl Fn(u8) -> u8) {
        for px in self.pixels.chunks_exact_mut(4) {
            for c in &mut px[..3] {
                *c = f(*c);
            }
        }
    }
}

fn arg(args: &[String], index: usize) -> Result<f32> {
    let raw = args
        .get(index)
        .ok_or_else(|| anyhow!("missing argument {}", index + 1))?;
    raw.parse::<f32>()
        .with_context(|| format!("argument {} is not a number: '{raw}'", index + 1))
}

fn to_byte(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn xorshift(mut x: u32) -> u32 {
    if x == 0 {
        x = 0x1234_5678;
    }
    for _ in 0..3 {
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
    }
    x
}
