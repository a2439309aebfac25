//! Binds a [`VirtualMachine`] to a single event listener, turning VN
//! opcode callbacks into a typed [`ScriptEvent`] stream and driving the
//! runtime state machine (dialogue typewriter, timed waits, transitions,
//! skip mode) from a per-frame [`ScriptRuntime::update`] tick.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use nms_core::bytecode::{CompiledScript, Opcode};
use nms_core::span::SourceLocation;
use tracing::{debug, info, warn};

use crate::value::Value;
use crate::vm::VirtualMachine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    Idle,
    Running,
    WaitingInput,
    WaitingChoice,
    WaitingTimer,
    WaitingTransition,
    Paused,
    Halted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptEventType {
    SceneChange,
    BackgroundChanged,
    CharacterShow,
    CharacterHide,
    DialogueStart,
    DialogueComplete,
    ChoiceStart,
    ChoiceSelected,
    TransitionStart,
    TransitionComplete,
    MusicStart,
    MusicStop,
    SoundPlay,
    VariableChanged,
    FlagChanged,
}

#[derive(Debug, Clone)]
pub struct ScriptEvent {
    pub kind: ScriptEventType,
    pub name: String,
    pub value: Option<Value>,
    pub location: Option<SourceLocation>,
}

impl ScriptEvent {
    fn new(kind: ScriptEventType, name: impl Into<String>, value: Option<Value>) -> Self {
        ScriptEvent { kind, name: name.into(), value, location: None }
    }
}

pub type EventListener = Box<dyn FnMut(&ScriptEvent)>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuntimeConfig {
    pub text_speed_cps: f32,
    pub default_transition_duration: f32,
    pub auto_advance_enabled: bool,
    pub auto_advance_delay: f32,
    pub skip_mode_speed_multiplier: f32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            text_speed_cps: 30.0,
            default_transition_duration: 0.5,
            auto_advance_enabled: false,
            auto_advance_delay: 2.0,
            skip_mode_speed_multiplier: 3.33,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeSaveState {
    pub current_scene: String,
    pub instruction_pointer: u32,
    pub variables: HashMap<String, Value>,
    pub flags: HashMap<String, bool>,
    pub visible_characters: Vec<String>,
    pub current_background: String,
    pub current_speaker: String,
    pub current_dialogue: String,
    pub current_choices: Vec<String>,
    pub selected_choice: i32,
    pub in_dialogue: bool,
    pub skip_mode: bool,
}

impl Default for RuntimeSaveState {
    fn default() -> Self {
        RuntimeSaveState {
            current_scene: String::new(),
            instruction_pointer: 0,
            variables: HashMap::new(),
            flags: HashMap::new(),
            visible_characters: Vec::new(),
            current_background: String::new(),
            current_speaker: String::new(),
            current_dialogue: String::new(),
            current_choices: Vec::new(),
            selected_choice: -1,
            in_dialogue: false,
            skip_mode: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeError(pub String);

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for RuntimeError {}

enum Effect {
    ShowBackground(String),
    ShowCharacter(String, i32),
    HideCharacter(String),
    Say(String, String),
    Choice(Vec<String>),
    GotoScene(i32),
    Wait(f32),
    PlaySound(String),
    PlayMusic(String),
    StopMusic(Option<f32>),
    Transition(String, f32),
}

pub struct ScriptRuntime {
    vm: VirtualMachine,
    script: CompiledScript,
    effects: Rc<RefCell<Vec<Effect>>>,
    state: RuntimeState,

    current_scene: String,
    current_background: String,
    visible_characters: Vec<String>,
    current_speaker: String,
    current_dialogue: String,
    dialogue_revealed: f32,
    dialogue_complete_fired: bool,
    auto_advance_timer: f32,

    current_choices: Vec<String>,
    selected_choice: i32,

    wait_timer: f32,
    transition_timer: f32,
    transition_duration: f32,

    config: RuntimeConfig,
    skip_mode: bool,
    listener: Option<EventListener>,
}

impl ScriptRuntime {
    pub fn new() -> Self {
        let effects = Rc::new(RefCell::new(Vec::new()));
        let mut vm = VirtualMachine::new();
        register_callbacks(&mut vm, &effects);
        ScriptRuntime {
            vm,
            script: CompiledScript::new(),
            effects,
            state: RuntimeState::Idle,
            current_scene: String::new(),
            current_background: String::new(),
            visible_characters: Vec::new(),
            current_speaker: String::new(),
            current_dialogue: String::new(),
            dialogue_revealed: 0.0,
            dialogue_complete_fired: false,
            auto_advance_timer: 0.0,
            current_choices: Vec::new(),
            selected_choice: -1,
            wait_timer: 0.0,
            transition_timer: 0.0,
            transition_duration: 0.0,
            config: RuntimeConfig::default(),
            skip_mode: false,
            listener: None,
        }
    }

    pub fn load(&mut self, script: CompiledScript) {
        self.vm.load(&script);
        self.script = script;
        self.state = RuntimeState::Idle;
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        let mut runtime = Self::new();
        runtime.config = config;
        runtime
    }

    pub fn set_config(&mut self, config: RuntimeConfig) {
        self.config = config;
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn set_event_callback(&mut self, callback: EventListener) {
        self.listener = Some(callback);
    }

    pub fn vm(&self) -> &VirtualMachine {
        &self.vm
    }

    /// Enters the first declared scene.
    pub fn start(&mut self) {
        if let Some((name, ip)) = self.script.scene_entry_points.first().cloned() {
            info!(scene = %name, "starting script execution");
            self.current_scene = name.clone();
            self.vm.set_ip(ip);
            self.state = RuntimeState::Running;
            self.fire(ScriptEventType::SceneChange, &name, Value::Null);
            self.drive();
        } else {
            warn!("no scenes declared; runtime has nothing to run");
            self.state = RuntimeState::Halted;
        }
    }

    pub fn goto_scene(&mut self, scene_name: &str) -> Result<(), RuntimeError> {
        let ip = self
            .script
            .scene_entry(scene_name)
            .ok_or_else(|| RuntimeError(format!("unknown scene: {scene_name}")))?;
        self.current_scene = scene_name.to_string();
        self.vm.set_ip(ip);
        self.state = RuntimeState::Running;
        self.fire(ScriptEventType::SceneChange, scene_name, Value::Null);
        self.drive();
        Ok(())
    }

    /// Advances the runtime by `dt` seconds: ticks timers, advances the
    /// dialogue typewriter, and resumes execution when a wait condition
    /// completes. The typewriter advances even while waiting on player
    /// input, matching a VN engine's usual feel.
    pub fn update(&mut self, dt: f64) {
        let dt = dt as f32;
        self.update_dialogue(dt);

        match self.state {
            RuntimeState::WaitingTimer => {
                self.wait_timer -= dt;
                if self.wait_timer <= 0.0 {
                    self.wait_timer = 0.0;
                    self.vm.signal_continue();
                    self.state = RuntimeState::Running;
                    self.drive();
                }
            }
            RuntimeState::WaitingTransition => {
                self.transition_timer -= dt;
                if self.transition_timer <= 0.0 {
                    self.transition_timer = 0.0;
                    self.fire(ScriptEventType::TransitionComplete, "", Value::Null);
                    self.vm.signal_continue();
                    self.state = RuntimeState::Running;
                    self.drive();
                }
            }
            RuntimeState::Running => self.drive(),
            _ => {}
        }

        if matches!(self.state, RuntimeState::WaitingInput) && self.config.auto_advance_enabled && self.dialogue_complete_fired {
            self.auto_advance_timer += dt;
            if self.auto_advance_timer >= self.config.auto_advance_delay {
                self.auto_advance_timer = 0.0;
                self.continue_execution();
            }
        }
    }

    fn update_dialogue(&mut self, dt: f32) {
        if self.current_dialogue.is_empty() || self.dialogue_complete_fired {
            return;
        }
        let speed = if self.skip_mode {
            self.config.text_speed_cps * self.config.skip_mode_speed_multiplier
        } else {
            self.config.text_speed_cps
        };
        self.dialogue_revealed += speed * dt;
        if self.dialogue_revealed >= self.current_dialogue.chars().count() as f32 {
            self.dialogue_revealed = self.current_dialogue.chars().count() as f32;
            self.dialogue_complete_fired = true;
            self.fire(ScriptEventType::DialogueComplete, &self.current_speaker.clone(), Value::Null);
        }
    }

    pub fn continue_execution(&mut self) {
        if self.state != RuntimeState::WaitingInput {
            return;
        }
        if !self.dialogue_complete_fired {
            // a click while the typewriter is still running reveals the
            // rest of the line instead of advancing past it
            self.dialogue_revealed = self.current_dialogue.chars().count() as f32;
            self.dialogue_complete_fired = true;
            self.fire(ScriptEventType::DialogueComplete, &self.current_speaker.clone(), Value::Null);
            return;
        }
        self.auto_advance_timer = 0.0;
        self.vm.signal_continue();
        self.state = RuntimeState::Running;
        self.drive();
    }

    pub fn select_choice(&mut self, index: i32) {
        if self.state != RuntimeState::WaitingChoice {
            return;
        }
        self.selected_choice = index;
        let label = self.current_choices.get(index as usize).cloned().unwrap_or_default();
        self.fire(ScriptEventType::ChoiceSelected, &label, Value::Int(index));
        self.current_choices.clear();
        self.vm.signal_choice(index);
        self.state = RuntimeState::Running;
        self.drive();
    }

    pub fn pause(&mut self) {
        if self.state != RuntimeState::Halted {
            self.vm.pause();
            self.state = RuntimeState::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.state == RuntimeState::Paused {
            self.vm.resume();
            self.state = RuntimeState::Running;
        }
    }

    pub fn stop(&mut self) {
        self.vm.reset();
        self.state = RuntimeState::Halted;
    }

    pub fn state(&self) -> RuntimeState {
        self.state
    }

    pub fn is_waiting_for_input(&self) -> bool {
        self.state == RuntimeState::WaitingInput
    }

    pub fn is_waiting_for_choice(&self) -> bool {
        self.state == RuntimeState::WaitingChoice
    }

    pub fn is_complete(&self) -> bool {
        self.state == RuntimeState::Halted
    }

    pub fn set_variable(&mut self, name: &str, value: Value) {
        self.fire(ScriptEventType::VariableChanged, name, value.clone());
        self.vm.set_variable(name, value);
    }

    pub fn variable(&self, name: &str) -> Value {
        self.vm.variable(name)
    }

    pub fn set_flag(&mut self, name: &str, value: bool) {
        self.fire(ScriptEventType::FlagChanged, name, Value::Bool(value));
        self.vm.set_flag(name, value);
    }

    pub fn flag(&self, name: &str) -> bool {
        self.vm.flag(name)
    }

    pub fn all_variables(&self) -> HashMap<String, Value> {
        self.vm.all_variables().clone()
    }

    pub fn all_flags(&self) -> HashMap<String, bool> {
        self.vm.all_flags().clone()
    }

    pub fn set_skip_mode(&mut self, enabled: bool) {
        self.skip_mode = enabled;
    }

    pub fn is_skip_mode(&self) -> bool {
        self.skip_mode
    }

    pub fn current_scene(&self) -> &str {
        &self.current_scene
    }

    pub fn current_background(&self) -> &str {
        &self.current_background
    }

    pub fn visible_characters(&self) -> &[String] {
        &self.visible_characters
    }

    pub fn current_choices(&self) -> &[String] {
        &self.current_choices
    }

    pub fn current_speaker(&self) -> &str {
        &self.current_speaker
    }

    pub fn dialogue_fully_revealed(&self) -> bool {
        self.dialogue_complete_fired
    }

    /// The portion of the current line the typewriter has revealed so far.
    pub fn current_dialogue(&self) -> String {
        self.current_dialogue.chars().take(self.dialogue_revealed as usize).collect()
    }

    pub fn save_state(&self) -> RuntimeSaveState {
        RuntimeSaveState {
            current_scene: self.current_scene.clone(),
            instruction_pointer: self.vm.ip(),
            variables: self.all_variables(),
            flags: self.all_flags(),
            visible_characters: self.visible_characters.clone(),
            current_background: self.current_background.clone(),
            current_speaker: self.current_speaker.clone(),
            current_dialogue: self.current_dialogue.clone(),
            current_choices: self.current_choices.clone(),
            selected_choice: self.selected_choice,
            in_dialogue: self.state == RuntimeState::WaitingInput,
            skip_mode: self.skip_mode,
        }
    }

    pub fn load_state(&mut self, saved: RuntimeSaveState) -> Result<(), RuntimeError> {
        self.vm.reset();
        self.vm.set_ip(saved.instruction_pointer);
        for (name, value) in &saved.variables {
            self.vm.set_variable(name, value.clone());
        }
        for (name, value) in &saved.flags {
            self.vm.set_flag(name, *value);
        }
        self.current_scene = saved.current_scene;
        self.current_background = saved.current_background;
        self.visible_characters = saved.visible_characters;
        self.current_speaker = saved.current_speaker;
        self.current_dialogue = saved.current_dialogue;
        self.dialogue_revealed = self.current_dialogue.chars().count() as f32;
        self.dialogue_complete_fired = true;
        self.current_choices = saved.current_choices;
        self.selected_choice = saved.selected_choice;
        self.skip_mode = saved.skip_mode;

        self.state = if !self.current_choices.is_empty() && self.selected_choice < 0 {
            RuntimeState::WaitingChoice
        } else if saved.in_dialogue {
            RuntimeState::WaitingInput
        } else {
            RuntimeState::Running
        };
        Ok(())
    }

    /// Runs VM steps until a genuine suspension (one visible to the
    /// embedder) or halt. `GOTO_SCENE` suspends the VM too, but the
    /// coordinator resumes it immediately so scene transitions never
    /// surface as a wait state.
    fn drive(&mut self) {
        loop {
            if self.state != RuntimeState::Running {
                return;
            }
            let progressed = self.vm.step();
            self.drain_effects();
            if self.vm.is_halted() {
                self.state = RuntimeState::Halted;
                return;
            }
            if self.state != RuntimeState::Running {
                // an effect handler moved us into a Waiting* state
                return;
            }
            if !progressed && !self.vm.is_waiting() {
                // program counter ran off the end without a Halt opcode
                self.state = RuntimeState::Halted;
                return;
            }
        }
    }

    fn drain_effects(&mut self) {
        let pending: Vec<Effect> = self.effects.borrow_mut().drain(..).collect();
        for effect in pending {
            self.handle_effect(effect);
        }
    }

    fn handle_effect(&mut self, effect: Effect) {
        match effect {
            Effect::ShowBackground(resource) => {
                self.current_background = resource.clone();
                self.fire(ScriptEventType::BackgroundChanged, &resource, Value::Null);
            }
            Effect::ShowCharacter(id, position) => {
                if !self.visible_characters.contains(&id) {
                    self.visible_characters.push(id.clone());
                }
                self.fire(ScriptEventType::CharacterShow, &id, Value::Int(position));
            }
            Effect::HideCharacter(id) => {
                self.visible_characters.retain(|c| c != &id);
                self.fire(ScriptEventType::CharacterHide, &id, Value::Null);
            }
            Effect::Say(speaker, text) => {
                self.current_speaker = speaker.clone();
                self.current_dialogue = text;
                self.dialogue_revealed = 0.0;
                self.dialogue_complete_fired = false;
                self.auto_advance_timer = 0.0;
                self.fire(ScriptEventType::DialogueStart, &speaker, Value::Null);
                self.state = RuntimeState::WaitingInput;
            }
            Effect::Choice(options) => {
                self.current_choices = options;
                self.selected_choice = -1;
                self.fire(ScriptEventType::ChoiceStart, "", Value::Int(self.current_choices.len() as i32));
                self.state = RuntimeState::WaitingChoice;
            }
            Effect::GotoScene(target_ip) => {
                if let Some(name) = self.scene_name_at(target_ip) {
                    self.current_scene = name.clone();
                    self.fire(ScriptEventType::SceneChange, &name, Value::Null);
                } else {
                    debug!(ip = target_ip, "goto target has no named scene entry");
                }
                self.vm.signal_continue();
            }
            Effect::Wait(duration) => {
                self.wait_timer = duration;
                self.state = RuntimeState::WaitingTimer;
            }
            Effect::PlaySound(resource) => {
                self.fire(ScriptEventType::SoundPlay, &resource, Value::Null);
            }
            Effect::PlayMusic(resource) => {
                self.fire(ScriptEventType::MusicStart, &resource, Value::Null);
            }
            Effect::StopMusic(fade) => {
                self.fire(ScriptEventType::MusicStop, "", fade.map(Value::Float).unwrap_or(Value::Null));
            }
            Effect::Transition(kind, duration) => {
                let duration = if duration > 0.0 { duration } else { self.config.default_transition_duration };
                self.transition_duration = duration;
                self.transition_timer = duration;
                self.fire(ScriptEventType::TransitionStart, &kind, Value::Float(duration));
                self.state = RuntimeState::WaitingTransition;
            }
        }
    }

    fn scene_name_at(&self, ip: i32) -> Option<String> {
        self.script
            .scene_entry_points
            .iter()
            .find(|(_, entry)| *entry == ip as u32)
            .map(|(name, _)| name.clone())
    }

    fn fire(&mut self, kind: ScriptEventType, name: &str, value: Value) {
        if let Some(listener) = self.listener.as_mut() {
            let value = match value {
                Value::Null => None,
                other => Some(other),
            };
            listener(&ScriptEvent::new(kind, name, value));
        }
    }
}

impl Default for ScriptRuntime {
    fn default() -> Self {
        Self::new()
    }
}

fn register_callbacks(vm: &mut VirtualMachine, effects: &Rc<RefCell<Vec<Effect>>>) {
    macro_rules! push {
        ($queue:expr, $effect:expr) => {
            $queue.borrow_mut().push($effect)
        };
    }

    let q = effects.clone();
    vm.register_callback(Opcode::ShowBackground, Box::new(move |args| push!(q, Effect::ShowBackground(args[0].as_string()))));

    let q = effects.clone();
    vm.register_callback(
        Opcode::ShowCharacter,
        Box::new(move |args| push!(q, Effect::ShowCharacter(args[0].as_string(), args[1].as_int()))),
    );

    let q = effects.clone();
    vm.register_callback(Opcode::HideCharacter, Box::new(move |args| push!(q, Effect::HideCharacter(args[0].as_string()))));

    let q = effects.clone();
    // native-callback contract is [text, speaker]; Effect::Say is speaker-first.
    vm.register_callback(Opcode::Say, Box::new(move |args| push!(q, Effect::Say(args[1].as_string(), args[0].as_string()))));

    let q = effects.clone();
    vm.register_callback(
        Opcode::Choice,
        Box::new(move |args| push!(q, Effect::Choice(args.iter().map(Value::as_string).collect()))),
    );

    let q = effects.clone();
    vm.register_callback(Opcode::GotoScene, Box::new(move |args| push!(q, Effect::GotoScene(args[0].as_int()))));

    let q = effects.clone();
    // args[0] is the raw f32 bit pattern reinterpreted through an int.
    vm.register_callback(
        Opcode::Wait,
        Box::new(move |args| push!(q, Effect::Wait(f32::from_bits(args[0].as_int() as u32)))),
    );

    let q = effects.clone();
    vm.register_callback(Opcode::PlaySound, Box::new(move |args| push!(q, Effect::PlaySound(args[0].as_string()))));

    let q = effects.clone();
    vm.register_callback(Opcode::PlayMusic, Box::new(move |args| push!(q, Effect::PlayMusic(args[0].as_string()))));

    let q = effects.clone();
    vm.register_callback(
        Opcode::StopMusic,
        Box::new(move |args| {
            let fade = match &args[0] {
                Value::Null => None,
                other => Some(other.as_float()),
            };
            push!(q, Effect::StopMusic(fade));
        }),
    );

    let q = effects.clone();
    vm.register_callback(
        Opcode::Transition,
        Box::new(move |args| push!(q, Effect::Transition(args[0].as_string(), args[1].as_float()))),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use nms_core::bytecode::Instruction;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn dialogue_script() -> CompiledScript {
        CompiledScript {
            instructions: vec![
                Instruction::bare(Opcode::PushNull),
                Instruction::new(Opcode::Say, 0),
                Instruction::bare(Opcode::Halt),
            ],
            string_table: vec!["hi there".to_string()],
            scene_entry_points: vec![("intro".to_string(), 0)],
            characters: vec![],
            variable_types: None,
        }
    }

    #[test]
    fn start_suspends_runtime_on_dialogue() {
        let mut runtime = ScriptRuntime::new();
        runtime.load(dialogue_script());
        runtime.start();
        assert!(runtime.is_waiting_for_input());
        assert_eq!(runtime.current_scene(), "intro");
    }

    #[test]
    fn typewriter_reveals_text_over_time_then_fires_complete() {
        let events: Rc<RefCell<Vec<ScriptEventType>>> = Rc::new(RefCell::new(Vec::new()));
        let events_clone = events.clone();
        let mut runtime = ScriptRuntime::new();
        runtime.set_event_callback(Box::new(move |e| events_clone.borrow_mut().push(e.kind)));
        runtime.load(dialogue_script());
        runtime.start();

        assert_eq!(runtime.current_dialogue(), "");
        runtime.update(0.05); // 30 chars/sec default speed -> 1.5 chars
        assert_eq!(runtime.current_dialogue(), "h");

        for _ in 0..20 {
            runtime.update(0.1);
        }
        assert_eq!(runtime.current_dialogue(), "hi there");
        assert!(events.borrow().contains(&ScriptEventType::DialogueComplete));
    }

    #[test]
    fn continue_after_dialogue_complete_halts_at_end_of_script() {
        let mut runtime = ScriptRuntime::new();
        runtime.load(dialogue_script());
        runtime.start();
        runtime.update(10.0); // reveal fully
        runtime.continue_execution();
        assert!(runtime.is_complete());
    }

    #[test]
    fn choice_selection_resumes_and_reports_index() {
        let script = CompiledScript {
            instructions: vec![
                Instruction::new(Opcode::PushInt, 2),
                Instruction::new(Opcode::PushString, 0),
                Instruction::new(Opcode::PushString, 1),
                Instruction::new(Opcode::Choice, 2),
                Instruction::bare(Opcode::Pop),
                Instruction::bare(Opcode::Pop),
                Instruction::bare(Opcode::Halt),
            ],
            string_table: vec!["Left".to_string(), "Right".to_string()],
            scene_entry_points: vec![("crossroads".to_string(), 0)],
            characters: vec![],
            variable_types: None,
        };
        let mut runtime = ScriptRuntime::new();
        runtime.load(script);
        runtime.start();
        assert!(runtime.is_waiting_for_choice());
        assert_eq!(runtime.current_choices(), ["Left", "Right"]);

        runtime.select_choice(1);
        assert!(runtime.is_complete());
    }

    #[test]
    fn save_and_load_state_round_trips_variables() {
        let mut runtime = ScriptRuntime::new();
        runtime.load(dialogue_script());
        runtime.start();
        runtime.set_variable("gold", Value::Int(42));
        let saved = runtime.save_state();

        let mut restored = ScriptRuntime::new();
        restored.load(dialogue_script());
        restored.load_state(saved).unwrap();
        assert_eq!(restored.variable("gold"), Value::Int(42));
        assert!(restored.is_waiting_for_input());
    }
}
