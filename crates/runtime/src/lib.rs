//! The bytecode virtual machine and the script runtime coordinator that
//! binds it to a single typed event listener.

pub mod coordinator;
pub mod value;
pub mod vm;

pub use coordinator::{
    RuntimeConfig, RuntimeError, RuntimeSaveState, RuntimeState, ScriptEvent, ScriptEventType, ScriptRuntime,
};
pub use value::Value;
pub use vm::{NativeCallback, VirtualMachine, VmFault};
