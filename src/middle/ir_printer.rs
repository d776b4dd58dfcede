//! IR Printer - Pretty print Lona IR
//!
//! Outputs human-readable IR for debugging and for the `lonac` output file.

use std::fmt::Write;

use crate::middle::ir::*;

/// Pretty printer for Lona IR
pub struct IRPrinter {
    output: String,
}

impl IRPrinter {
    pub fn new() -> Self {
        Self { output: String::new() }
    }

    /// Print an IR module to string
    pub fn print_module(&mut self, module: &IRModule) -> String {
        self.output.clear();

        writeln!(self.output, "; Module: {}", module.name).unwrap();
        writeln!(self.output, "; Functions: {}", module.functions.len()).unwrap();
        writeln!(self.output).unwrap();

        for st in &module.structs {
            let fields: Vec<_> = st.fields.iter().map(|t| t.to_string()).collect();
            writeln!(
                self.output,
                "%{} = type {{ {} }} ; size {}",
                st.name,
                fields.join(", "),
                st.size
            )
            .unwrap();
        }
        for global in &module.globals {
            writeln!(
                self.output,
                "@{} = private constant c\"{}\"",
                global.name,
                escape_bytes(&global.bytes)
            )
            .unwrap();
        }
        if !module.structs.is_empty() || !module.globals.is_empty() {
            writeln!(self.output).unwrap();
        }

        for func in &module.functions {
            self.print_function(func);
            writeln!(self.output).unwrap();
        }

        self.output.clone()
    }

    fn print_function(&mut self, func: &IRFunction) {
        if func.is_declaration() {
            write!(self.output, "declare ").unwrap();
        }
        write!(self.output, "fn {}(", func.name).unwrap();
        for (i, ty) in func.params.iter().enumerate() {
            if i > 0 {
                write!(self.output, ", ").unwrap();
            }
            if i == 0 && func.sret_type.is_some() {
                write!(self.output, "sret ").unwrap();
            }
            write!(self.output, "{} %arg{}", ty, i).unwrap();
        }
        write!(self.output, ") -> {}", func.ret_type).unwrap();

        if func.is_declaration() {
            writeln!(self.output).unwrap();
            return;
        }
        writeln!(self.output, " {{").unwrap();
        for block in func.ordered_blocks() {
            self.print_block(block);
        }
        writeln!(self.output, "}}").unwrap();
    }

    fn print_block(&mut self, block: &BasicBlock) {
        writeln!(self.output, "  bb{}: ; {}", block.id.0, block.label).unwrap();

        for inst in &block.instructions {
            write!(self.output, "    ").unwrap();
            self.print_instruction(inst);
            writeln!(self.output).unwrap();
        }

        if let Some(ref term) = block.terminator {
            write!(self.output, "    ").unwrap();
            self.print_terminator(term);
            writeln!(self.output).unwrap();
        }
    }

    fn print_instruction(&mut self, inst: &Instruction) {
        match inst {
            Instruction::BinOp { dest, op, ty, left, right } => {
                write!(self.output, "{} = {} {} {}, {}", dest, op, ty, left, right).unwrap();
            }
            Instruction::Cmp { dest, pred, ty, left, right } => {
                write!(self.output, "{} = cmp {} {} {}, {}", dest, pred, ty, left, right).unwrap();
            }
            Instruction::UnaryOp { dest, op, ty, value } => {
                write!(self.output, "{} = {} {} {}", dest, op, ty, value).unwrap();
            }
            Instruction::Call { dest, func, args, ret_ty } => {
                if let Some(d) = dest {
                    write!(self.output, "{} = ", d).unwrap();
                }
                let args: Vec<_> = args.iter().map(|a| a.to_string()).collect();
                write!(self.output, "call {} @{}({})", ret_ty, func, args.join(", ")).unwrap();
            }
            Instruction::Alloca { dest, ty } => {
                write!(self.output, "{} = alloca {}", dest, ty).unwrap();
            }
            Instruction::Load { dest, ptr, ty } => {
                write!(self.output, "{} = load {}, {}", dest, ty, ptr).unwrap();
            }
            Instruction::Store { ptr, value, ty } => {
                write!(self.output, "store {} {}, {}", ty, value, ptr).unwrap();
            }
            Instruction::StructGep { dest, ptr, struct_name, index } => {
                write!(self.output, "{} = gep %{}, {}, {}", dest, struct_name, ptr, index).unwrap();
            }
            Instruction::MemCpy { dest, src, size } => {
                write!(self.output, "memcpy {}, {}, {}", dest, src, size).unwrap();
            }
        }
    }

    fn print_terminator(&mut self, term: &Terminator) {
        match term {
            Terminator::Return { value: Some(v) } => {
                write!(self.output, "ret {}", v).unwrap();
            }
            Terminator::Return { value: None } => {
                write!(self.output, "ret void").unwrap();
            }
            Terminator::Jump { target } => {
                write!(self.output, "br bb{}", target.0).unwrap();
            }
            Terminator::Branch { cond, then_target, else_target } => {
                write!(self.output, "br {}, bb{}, bb{}", cond, then_target.0, else_target.0).unwrap();
            }
        }
    }
}

impl Default for IRPrinter {
    fn default() -> Self {
        Self::new()
    }
}

fn escape_bytes(bytes: &[u8]) -> String {
    let mut out = String::new();
    for &b in bytes {
        if (b.is_ascii_graphic() && b != b'"' && b != b'\\') || b == b' ' {
            out.push(b as char);
        } else {
            write!(out, "\\{:02X}", b).unwrap();
        }
    }
    out
}

/// Convenience function to print a module
pub fn print_ir(module: &IRModule) -> String {
    let mut printer = IRPrinter::new();
    printer.print_module(module)
}
