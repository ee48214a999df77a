use std::fmt;

/// The final instruction set. One byte of opcode followed
/// by 0–N inline operand bytes; operand widths are fixed per opcode, not
/// length-prefixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Instruction {
    Constant,
    Nil,
    True,
    False,
    Pop,
    GetLocal,
    SetLocal,
    GetGlobal,
    SetGlobal,
    DefineGlobal,
    GetUpvalue,
    SetUpvalue,
    GetProperty,
    SetProperty,
    GetSuper,
    Equal,
    Greater,
    Less,
    Add,
    Subtract,
    Multiply,
    Divide,
    Not,
    Negate,
    Print,
    Jump,
    JumpIfFalse,
    Loop,
    Call,
    Invoke,
    SuperInvoke,
    Closure,
    CloseUpvalue,
    Return,
    Class,
    Inherit,
    Method,
}

impl From<u8> for Instruction {
    fn from(byte: u8) -> Self {
        use Instruction::*;
        match byte {
            0 => Constant,
            1 => Nil,
            2 => True,
            3 => False,
            4 => Pop,
            5 => GetLocal,
            6 => SetLocal,
            7 => GetGlobal,
            8 => SetGlobal,
            9 => DefineGlobal,
            10 => GetUpvalue,
            11 => SetUpvalue,
            12 => GetProperty,
            13 => SetProperty,
            14 => GetSuper,
            15 => Equal,
            16 => Greater,
            17 => Less,
            18 => Add,
            19 => Subtract,
            20 => Multiply,
            21 => Divide,
            22 => Not,
            23 => Negate,
            24 => Print,
            25 => Jump,
            26 => JumpIfFalse,
            27 => Loop,
            28 => Call,
            29 => Invoke,
            30 => SuperInvoke,
            31 => Closure,
            32 => CloseUpvalue,
            33 => Return,
            34 => Class,
            35 => Inherit,
            36 => Method,
            _ => unreachable!("invalid opcode byte {byte}"),
        }
    }
}

/// Contiguous bytecode plus its constant pool and line table. `lines[i]` is the source line of `code[i]`, so
/// `lines.len() == code.len()` always holds.
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    code: Vec<u8>,
    lines: Vec<usize>,
    constants: Vec<super::value::Value>,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn byte(&self, offset: usize) -> u8 {
        self.code[offset]
    }

    pub fn instruction(&self, offset: usize) -> Instruction {
        Instruction::from(self.code[offset])
    }

    pub fn line(&self, offset: usize) -> usize {
        self.lines[offset]
    }

    pub fn constants(&self) -> &[super::value::Value] {
        &self.constants
    }

    pub fn constant(&self, idx: usize) -> super::value::Value {
        self.constants[idx].clone()
    }

    pub fn write_byte(&mut self, byte: u8, line: usize) {
        self.code.push(byte);
        self.lines.push(line);
    }

    pub fn write_instr(&mut self, instr: Instruction, line: usize) {
        self.write_byte(instr as u8, line);
    }

    /// Appends `value` to the constant pool (no deduplication beyond
    /// what the compiler does for identifiers) and returns its index.
    /// Returns `Err` once the pool would exceed 256 entries — the
    /// one-byte operand budget every `CONSTANT`-family opcode allows.
    pub fn add_constant(&mut self, value: super::value::Value) -> Result<u8, ()> {
        if self.constants.len() >= u8::MAX as usize + 1 {
            return Err(());
        }
        self.constants.push(value);
        Ok((self.constants.len() - 1) as u8)
    }

    /// Writes a two-byte placeholder after `instr` and returns its
    /// offset; call [`Chunk::patch_jump`] with that offset once the
    /// jump target is known.
    pub fn emit_jump(&mut self, instr: Instruction, line: usize) -> usize {
        self.write_instr(instr, line);
        self.write_byte(0xff, line);
        self.write_byte(0xff, line);
        self.code.len() - 2
    }

    /// Overwrites the placeholder at `offset` with the (big-endian)
    /// forward distance from just past the placeholder to the current
    /// end of the chunk. Fails if that distance doesn't fit in `u16`.
    pub fn patch_jump(&mut self, offset: usize) -> Result<(), ()> {
        let jump = self.code.len() - offset - 2;
        if jump > u16::MAX as usize {
            return Err(());
        }
        self.code[offset] = (jump >> 8) as u8;
        self.code[offset + 1] = jump as u8;
        Ok(())
    }

    /// Emits `LOOP` plus the backward distance from here to `loop_start`.
    pub fn emit_loop(&mut self, loop_start: usize, line: usize) -> Result<(), ()> {
        self.write_instr(Instruction::Loop, line);
        let offset = self.code.len() - loop_start + 2;
        if offset > u16::MAX as usize {
            return Err(());
        }
        self.write_byte((offset >> 8) as u8, line);
        self.write_byte(offset as u8, line);
        Ok(())
    }

    pub fn read_u16(&self, offset: usize) -> u16 {
        ((self.code[offset] as u16) << 8) | self.code[offset + 1] as u16
    }
}

impl fmt::Display for Chunk {
    /// A plain disassembler — kept as a debugging aid rather than a
    /// normative surface.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Instruction::*;
        let mut offset = 0;
        let mut prev_line = usize::MAX;
        while offset < self.len() {
            let line = self.line(offset);
            if line != prev_line {
                write!(f, "{line:>4} ")?;
                prev_line = line;
            } else {
                write!(f, "   | ")?;
            }
            let instr = self.instruction(offset);
            write!(f, "{offset:04} {instr:?}")?;
            offset += 1;
            match instr {
                Constant | GetGlobal | SetGlobal | DefineGlobal | GetProperty | SetProperty
                | GetSuper => {
                    let idx = self.byte(offset) as usize;
                    writeln!(f, " {idx} ({})", self.constant(idx))?;
                    offset += 1;
                }
                GetLocal | SetLocal | GetUpvalue | SetUpvalue | Call => {
                    writeln!(f, " {}", self.byte(offset))?;
                    offset += 1;
                }
                Invoke | SuperInvoke => {
                    let idx = self.byte(offset) as usize;
                    let argc = self.byte(offset + 1);
                    writeln!(f, " {idx} ({}) argc={argc}", self.constant(idx))?;
                    offset += 2;
                }
                Jump | JumpIfFalse => {
                    let jump = self.read_u16(offset) as usize;
                    writeln!(f, " -> {}", offset + 2 + jump)?;
                    offset += 2;
                }
                Loop => {
                    let jump = self.read_u16(offset) as usize;
                    writeln!(f, " -> {}", offset + 2 - jump)?;
                    offset += 2;
                }
                Closure => {
                    let idx = self.byte(offset) as usize;
                    writeln!(f, " {idx} ({})", self.constant(idx))?;
                    offset += 1;
                    if let super::value::Value::Obj(super::value::Obj::Function(function)) =
                        self.constant(idx)
                    {
                        for _ in 0..function.upvalue_count {
                            let is_local = self.byte(offset) != 0;
                            let idx = self.byte(offset + 1);
                            writeln!(
                                f,
                                "      | {} {idx}",
                                if is_local { "local" } else { "upvalue" }
                            )?;
                            offset += 2;
                        }
                    }
                }
                Class | Method => {
                    let idx = self.byte(offset) as usize;
                    writeln!(f, " {idx} ({})", self.constant(idx))?;
                    offset += 1;
                }
                Nil | True | False | Pop | Equal | Greater | Less | Add | Subtract | Multiply
                | Divide | Not | Negate | Print | CloseUpvalue | Return | Inherit => {
                    writeln!(f)?;
                }
            }
        }
        Ok(())
    }
}
