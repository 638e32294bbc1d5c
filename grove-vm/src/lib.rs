mod builtins;
pub mod bytecode;
pub mod callsite;
pub mod compiler;
pub mod config;
pub mod error;
pub mod logging;
pub mod meta;
pub mod runtime;
pub mod value;
pub mod vm;

pub use bytecode::{BytecodeBuilder, OpCode, Program};
pub use callsite::{CallSite, CallSiteTable, InvokeTier, SiteHeader, SiteTag};
pub use compiler::{BinaryOp, CompileError, Compiler, Expr, Stmt, compile};
pub use config::{CallSiteConfig, ConfigError};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::init as init_logging;
pub use meta::{
    Category, ClassBuilder, Lookup, MetaClass, MetaClassRegistry, MetaKind, MetaMethod,
    MetaProperty, ParamType, Visibility, has_active_category, use_category,
};
pub use runtime::{CallSiteStats, Runtime, StatsSnapshot};
pub use value::{HostObject, Instance, TypeId, Value, Wrapper};
pub use vm::{LoadedUnit, Vm, VmError, VmResult, run_program};
