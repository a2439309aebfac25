//! Stack-based virtual machine executing a [`CompiledScript`]. Single
//! instance, single-threaded, cooperative: [`VirtualMachine::step`] runs
//! one instruction and returns, suspending (the `waiting` bit) on the
//! handful of opcodes that need an external signal before continuing.

use std::collections::HashMap;

use nms_core::bytecode::{CompiledScript, Instruction, Opcode};

use crate::value::Value;

pub type NativeCallback = Box<dyn FnMut(&[Value])>;

const DEFAULT_STACK_CAP: usize = 1024;

/// Opcodes that suspend execution until an external signal arrives.
/// `GotoScene` suspends too, but the coordinator re-enters immediately
/// on its own rather than waiting on player input.
const SUSPENDING_OPCODES: &[Opcode] = &[Opcode::Say, Opcode::Choice, Opcode::Wait, Opcode::Transition, Opcode::GotoScene];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmFault {
    StackOverflow,
    DivisionByZero,
    ModuloByZero,
}

pub struct VirtualMachine {
    program: Vec<Instruction>,
    string_table: Vec<String>,
    stack: Vec<Value>,
    variables: HashMap<String, Value>,
    flags: HashMap<String, bool>,
    callbacks: HashMap<Opcode, NativeCallback>,
    ip: u32,
    running: bool,
    paused: bool,
    waiting: bool,
    halted: bool,
    stack_cap: usize,
    faults: Vec<VmFault>,
}

impl VirtualMachine {
    pub fn new() -> Self {
        VirtualMachine {
            program: Vec::new(),
            string_table: Vec::new(),
            stack: Vec::new(),
            variables: HashMap::new(),
            flags: HashMap::new(),
            callbacks: HashMap::new(),
            ip: 0,
            running: false,
            paused: false,
            waiting: false,
            halted: false,
            stack_cap: DEFAULT_STACK_CAP,
            faults: Vec::new(),
        }
    }

    pub fn with_stack_cap(mut self, cap: usize) -> Self {
        self.stack_cap = cap;
        self
    }

    pub fn load(&mut self, script: &CompiledScript) {
        self.program = script.instructions.clone();
        self.string_table = script.string_table.clone();
        self.reset();
    }

    pub fn reset(&mut self) {
        self.stack.clear();
        self.variables.clear();
        self.flags.clear();
        self.ip = 0;
        self.running = false;
        self.paused = false;
        self.waiting = false;
        self.halted = false;
        self.faults.clear();
    }

    pub fn register_callback(&mut self, op: Opcode, callback: NativeCallback) {
        self.callbacks.insert(op, callback);
    }

    pub fn set_ip(&mut self, ip: u32) {
        self.ip = ip;
        self.running = true;
        self.halted = false;
        self.waiting = false;
    }

    pub fn ip(&self) -> u32 {
        self.ip
    }

    pub fn is_running(&self) -> bool {
        self.running && !self.paused && !self.waiting && !self.halted
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_waiting(&self) -> bool {
        self.waiting
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn faults(&self) -> &[VmFault] {
        &self.faults
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn set_variable(&mut self, name: &str, value: Value) {
        self.variables.insert(name.to_string(), value);
    }

    pub fn variable(&self, name: &str) -> Value {
        self.variables.get(name).cloned().unwrap_or(Value::Null)
    }

    pub fn all_variables(&self) -> &HashMap<String, Value> {
        &self.variables
    }

    pub fn set_flag(&mut self, name: &str, value: bool) {
        self.flags.insert(name.to_string(), value);
    }

    pub fn flag(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }

    pub fn all_flags(&self) -> &HashMap<String, bool> {
        &self.flags
    }

    /// Clears the `waiting` bit and resumes from the instruction after
    /// the suspension point.
    pub fn signal_continue(&mut self) {
        self.waiting = false;
    }

    /// Pushes the chosen option index, then clears `waiting` so the
    /// jump-table bytecode following `CHOICE` can read it.
    pub fn signal_choice(&mut self, choice: i32) {
        self.push(Value::Int(choice));
        self.waiting = false;
    }

    fn push(&mut self, value: Value) {
        if self.stack.len() >= self.stack_cap {
            self.faults.push(VmFault::StackOverflow);
            self.halted = true;
            self.running = false;
            return;
        }
        self.stack.push(value);
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().unwrap_or(Value::Null)
    }

    fn string_at(&self, index: u32) -> String {
        self.string_table.get(index as usize).cloned().unwrap_or_default()
    }

    fn invoke(&mut self, op: Opcode, args: &[Value]) {
        if let Some(callback) = self.callbacks.get_mut(&op) {
            callback(args);
        }
    }

    /// Runs instructions until a suspension point, halt, pause, or the
    /// instruction stream is exhausted.
    pub fn run(&mut self) {
        while self.step() {}
    }

    /// Executes one instruction. Returns `true` if execution can
    /// continue immediately (more steps would make progress), `false`
    /// if the VM is now waiting, paused, or halted.
    pub fn step(&mut self) -> bool {
        if self.paused || self.waiting || self.halted {
            return false;
        }
        if self.ip as usize >= self.program.len() {
            self.halted = true;
            self.running = false;
            return false;
        }

        self.running = true;
        let instr = self.program[self.ip as usize];
        self.execute(instr);
        self.ip = self.ip.wrapping_add(1);

        !(self.paused || self.waiting || self.halted)
    }

    fn execute(&mut self, instr: Instruction) {
        match instr.opcode {
            Opcode::Nop => {}
            Opcode::Halt => {
                self.halted = true;
                self.running = false;
            }
            Opcode::Jump => self.jump_to(instr.operand),
            Opcode::JumpIf => {
                let cond = self.pop();
                if cond.as_bool() {
                    self.jump_to(instr.operand);
                }
            }
            Opcode::JumpIfNot => {
                let cond = self.pop();
                if !cond.as_bool() {
                    self.jump_to(instr.operand);
                }
            }
            Opcode::Call => {
                // Non-native callees resolved by `operand`'s string-table
                // index are a no-op that pushes null; no user-defined
                // function facility exists.
                let _ = self.string_at(instr.operand);
                self.push(Value::Null);
            }
            Opcode::Return => {}

            Opcode::PushInt => self.push(Value::Int(instr.operand as i32)),
            Opcode::PushFloat => self.push(Value::Float(instr.operand_as_f32())),
            Opcode::PushString => {
                let s = self.string_at(instr.operand);
                self.push(Value::String(s));
            }
            Opcode::PushBool => self.push(Value::Bool(instr.operand != 0)),
            Opcode::PushNull => self.push(Value::Null),
            Opcode::Pop => {
                self.pop();
            }
            Opcode::Dup => {
                let top = self.stack.last().cloned().unwrap_or(Value::Null);
                self.push(top);
            }

            Opcode::LoadVar | Opcode::LoadGlobal => {
                let name = self.string_at(instr.operand);
                let value = self.variable(&name);
                self.push(value);
            }
            Opcode::StoreVar | Opcode::StoreGlobal => {
                let value = self.pop();
                let name = self.string_at(instr.operand);
                self.set_variable(&name, value);
            }

            Opcode::Add => self.add(),
            Opcode::Sub => self.binary_numeric(|a, b| a - b, |a, b| a - b),
            Opcode::Mul => self.binary_numeric(|a, b| a * b, |a, b| a * b),
            Opcode::Div => self.divide(false),
            Opcode::Mod => self.divide(true),
            Opcode::Neg => {
                let v = self.pop();
                self.push(Value::Float(-v.as_float()));
            }

            Opcode::Eq => {
                let b = self.pop();
                let a = self.pop();
                self.push(Value::Bool(a.loosely_equals(&b)));
            }
            Opcode::Ne => {
                let b = self.pop();
                let a = self.pop();
                self.push(Value::Bool(!a.loosely_equals(&b)));
            }
            Opcode::Lt => self.compare(|a, b| a < b),
            Opcode::Le => self.compare(|a, b| a <= b),
            Opcode::Gt => self.compare(|a, b| a > b),
            Opcode::Ge => self.compare(|a, b| a >= b),

            Opcode::And => {
                let b = self.pop();
                let a = self.pop();
                self.push(Value::Bool(a.as_bool() && b.as_bool()));
            }
            Opcode::Or => {
                let b = self.pop();
                let a = self.pop();
                self.push(Value::Bool(a.as_bool() || b.as_bool()));
            }
            Opcode::Not => {
                let v = self.pop();
                self.push(Value::Bool(!v.as_bool()));
            }

            Opcode::ShowBackground => {
                let resource = self.string_at(instr.operand);
                self.invoke(Opcode::ShowBackground, &[Value::String(resource)]);
            }
            Opcode::ShowCharacter => {
                let position = self.pop();
                let identifier = self.pop();
                self.invoke(Opcode::ShowCharacter, &[identifier, position]);
            }
            Opcode::HideCharacter => {
                let identifier = self.pop();
                self.invoke(Opcode::HideCharacter, &[identifier]);
            }
            Opcode::Say => {
                let speaker = self.pop();
                let text = Value::String(self.string_at(instr.operand));
                self.invoke(Opcode::Say, &[text, speaker]);
                self.waiting = true;
            }
            Opcode::Choice => {
                let count = instr.operand as usize;
                let mut texts = Vec::with_capacity(count);
                for _ in 0..count {
                    texts.push(self.pop());
                }
                texts.reverse();
                self.invoke(Opcode::Choice, &texts);
                self.waiting = true;
            }
            Opcode::SetFlag => {
                let value = self.pop().as_bool();
                let name = self.string_at(instr.operand);
                self.set_flag(&name, value);
            }
            Opcode::CheckFlag => {
                let name = self.string_at(instr.operand);
                let value = self.flag(&name);
                self.push(Value::Bool(value));
            }
            Opcode::PlaySound => {
                let resource = self.string_at(instr.operand);
                self.invoke(Opcode::PlaySound, &[Value::String(resource)]);
            }
            Opcode::PlayMusic => {
                let resource = self.string_at(instr.operand);
                self.invoke(Opcode::PlayMusic, &[Value::String(resource)]);
            }
            Opcode::StopMusic => {
                let fade = match self.stack.last() {
                    Some(Value::Float(_)) | Some(Value::Int(_)) => self.pop(),
                    _ => Value::Null,
                };
                self.invoke(Opcode::StopMusic, &[fade]);
            }
            Opcode::Wait => {
                // Raw bit pattern, not the decoded float: the native-callback
                // contract hands the embedder an int it reinterprets itself.
                let duration_bits = Value::Int(instr.operand as i32);
                self.invoke(Opcode::Wait, &[duration_bits]);
                self.waiting = true;
            }
            Opcode::Transition => {
                let duration = self.pop();
                let kind = Value::String(self.string_at(instr.operand));
                self.invoke(Opcode::Transition, &[kind, duration]);
                self.waiting = true;
            }
            Opcode::GotoScene => {
                self.invoke(Opcode::GotoScene, &[Value::Int(instr.operand as i32)]);
                self.waiting = true;
                self.jump_to(instr.operand);
            }
        }
    }

    fn jump_to(&mut self, operand: u32) {
        // `operand - 1` so the caller's post-increment lands on `operand`;
        // `operand == 0` is represented by wrapping, which the `+= 1` in
        // `step` resolves back to 0.
        self.ip = operand.wrapping_sub(1);
    }

    /// `ADD` with any string operand concatenates; two ints stay an int;
    /// anything else (a float operand present) promotes to float.
    fn add(&mut self) {
        let b = self.pop();
        let a = self.pop();
        let result = match (&a, &b) {
            (Value::String(_), _) | (_, Value::String(_)) => Value::String(format!("{}{}", a.as_string(), b.as_string())),
            (Value::Int(x), Value::Int(y)) => Value::Int(x + y),
            _ => Value::Float(a.as_float() + b.as_float()),
        };
        self.push(result);
    }

    /// Two ints yield an int via `int_op`; any float argument promotes to
    /// float via `float_op`.
    fn binary_numeric(&mut self, int_op: impl Fn(i32, i32) -> i32, float_op: impl Fn(f32, f32) -> f32) {
        let b = self.pop();
        let a = self.pop();
        let result = match (&a, &b) {
            (Value::Int(x), Value::Int(y)) => Value::Int(int_op(*x, *y)),
            _ => Value::Float(float_op(a.as_float(), b.as_float())),
        };
        self.push(result);
    }

    fn compare(&mut self, f: impl Fn(f32, f32) -> bool) {
        let b = self.pop();
        let a = self.pop();
        self.push(Value::Bool(f(a.as_float(), b.as_float())));
    }

    fn divide(&mut self, modulo: bool) {
        let b = self.pop();
        let a = self.pop();
        let divisor = b.as_float();
        if divisor == 0.0 {
            self.faults.push(if modulo { VmFault::ModuloByZero } else { VmFault::DivisionByZero });
            self.push(Value::Float(0.0));
            return;
        }
        let result = if modulo { a.as_float() % divisor } else { a.as_float() / divisor };
        self.push(Value::Float(result));
    }

    /// Whether `op` is one of the VN opcodes that suspends the VM.
    pub fn is_suspending(op: Opcode) -> bool {
        SUSPENDING_OPCODES.contains(&op)
    }
}

impl Default for VirtualMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn script_with(instructions: Vec<Instruction>, strings: Vec<&str>) -> CompiledScript {
        CompiledScript {
            instructions,
            string_table: strings.into_iter().map(String::from).collect(),
            scene_entry_points: vec![],
            characters: vec![],
            variable_types: None,
        }
    }

    #[test]
    fn arithmetic_keeps_ints_int_and_promotes_on_float() {
        let two_ints = script_with(
            vec![
                Instruction::new(Opcode::PushInt, 2),
                Instruction::new(Opcode::PushInt, 3),
                Instruction::bare(Opcode::Add),
                Instruction::bare(Opcode::Halt),
            ],
            vec![],
        );
        let mut vm = VirtualMachine::new();
        vm.load(&two_ints);
        vm.set_ip(0);
        vm.run();
        assert_eq!(vm.stack.last(), Some(&Value::Int(5)));

        let int_and_float = script_with(
            vec![
                Instruction::new(Opcode::PushInt, 2),
                Instruction::with_f32_operand(Opcode::PushFloat, 3.0),
                Instruction::bare(Opcode::Add),
                Instruction::bare(Opcode::Halt),
            ],
            vec![],
        );
        let mut vm = VirtualMachine::new();
        vm.load(&int_and_float);
        vm.set_ip(0);
        vm.run();
        assert_eq!(vm.stack.last(), Some(&Value::Float(5.0)));
    }

    #[test]
    fn add_with_a_string_operand_concatenates() {
        let script = script_with(
            vec![
                Instruction::new(Opcode::PushString, 0),
                Instruction::new(Opcode::PushInt, 2),
                Instruction::bare(Opcode::Add),
                Instruction::bare(Opcode::Halt),
            ],
            vec!["score: "],
        );
        let mut vm = VirtualMachine::new();
        vm.load(&script);
        vm.set_ip(0);
        vm.run();
        assert_eq!(vm.stack.last(), Some(&Value::String("score: 2".to_string())));
    }

    #[test]
    fn division_by_zero_faults_and_yields_zero() {
        let script = script_with(
            vec![
                Instruction::new(Opcode::PushInt, 5),
                Instruction::new(Opcode::PushInt, 0),
                Instruction::bare(Opcode::Div),
                Instruction::bare(Opcode::Halt),
            ],
            vec![],
        );
        let mut vm = VirtualMachine::new();
        vm.load(&script);
        vm.set_ip(0);
        vm.run();
        assert_eq!(vm.stack.last(), Some(&Value::Float(0.0)));
        assert_eq!(vm.faults(), &[VmFault::DivisionByZero]);
    }

    #[test]
    fn say_suspends_and_signal_continue_resumes() {
        let script = script_with(
            vec![
                Instruction::bare(Opcode::PushNull),
                Instruction::new(Opcode::Say, 0),
                Instruction::bare(Opcode::Halt),
            ],
            vec!["hello"],
        );
        let seen: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        let mut vm = VirtualMachine::new();
        vm.load(&script);
        vm.register_callback(
            Opcode::Say,
            Box::new(move |args| {
                seen_clone.borrow_mut().push(args[0].as_string());
            }),
        );
        vm.set_ip(0);
        vm.run();
        assert!(vm.is_waiting());
        assert_eq!(seen.borrow().as_slice(), ["hello"]);

        vm.signal_continue();
        vm.run();
        assert!(vm.is_halted());
    }

    #[test]
    fn choice_jump_table_dispatches_to_selected_option() {
        // Mirrors nms-compiler's choice bytecode shape for two options:
        // the count stays on the stack under the chosen index while each
        // branch compares and consumes it.
        let script = script_with(
            vec![
                Instruction::new(Opcode::PushInt, 2), // 0: count
                Instruction::new(Opcode::PushString, 0), // 1: "L"
                Instruction::new(Opcode::PushString, 1), // 2: "R"
                Instruction::new(Opcode::Choice, 2), // 3
                // option 0
                Instruction::bare(Opcode::Dup), // 4
                Instruction::new(Opcode::PushInt, 0), // 5
                Instruction::bare(Opcode::Eq), // 6
                Instruction::new(Opcode::JumpIfNot, 11), // 7
                Instruction::bare(Opcode::Pop), // 8
                Instruction::new(Opcode::PushInt, 111), // 9: body marker for option 0
                Instruction::new(Opcode::Jump, 13), // 10
                // option 1
                Instruction::bare(Opcode::Pop), // 11
                Instruction::new(Opcode::PushInt, 222), // 12: body marker for option 1
                Instruction::bare(Opcode::Halt), // 13
            ],
            vec!["L", "R"],
        );
        let mut vm = VirtualMachine::new();
        vm.load(&script);
        vm.set_ip(0);
        vm.run();
        assert!(vm.is_waiting());

        vm.signal_choice(1);
        vm.run();
        assert!(vm.is_halted());
        assert_eq!(vm.stack.last(), Some(&Value::Int(222)));
    }

    #[test]
    fn stack_overflow_halts_the_machine() {
        let mut instructions = Vec::new();
        for _ in 0..5 {
            instructions.push(Instruction::new(Opcode::PushInt, 1));
        }
        instructions.push(Instruction::bare(Opcode::Halt));
        let script = script_with(instructions, vec![]);
        let mut vm = VirtualMachine::new().with_stack_cap(3);
        vm.load(&script);
        vm.set_ip(0);
        vm.run();
        assert!(vm.is_halted());
        assert_eq!(vm.faults(), &[VmFault::StackOverflow]);
    }
}
