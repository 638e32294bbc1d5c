#[derive(Clone, Debug, PartialEq)]
pub enum RuntimeError {
    MissingMethod {
        receiver: String,
        name: String,
        arg_types: Vec<String>,
    },
    MissingProperty {
        receiver: String,
        name: String,
    },
    MissingConstructor {
        receiver: String,
        arg_types: Vec<String>,
    },
    NullReceiver {
        name: String,
        property: bool,
    },
    UnknownType(u32),
    Coercion {
        expected: String,
        found: String,
    },
    /// A language-level exception raised by the target itself.
    Thrown {
        kind: String,
        message: String,
    },
    InvalidSlot(usize),
    /// Carries a target failure across the dispatch layer. Never reaches
    /// callers of the public entry points.
    Invocation(Box<RuntimeError>),
}

impl RuntimeError {
    pub fn thrown(kind: impl Into<String>, message: impl Into<String>) -> Self {
        RuntimeError::Thrown {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub(crate) fn transport(self) -> Self {
        match self {
            RuntimeError::Invocation(_) => self,
            other => RuntimeError::Invocation(Box::new(other)),
        }
    }

    pub fn unwrap_invocation(self) -> Self {
        let mut current = self;
        while let RuntimeError::Invocation(inner) = current {
            current = *inner;
        }
        current
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, RuntimeError::Invocation(_))
    }
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuntimeError::MissingMethod {
                receiver,
                name,
                arg_types,
            } => write!(
                f,
                "no signature of method {receiver}.{name}() is applicable for argument types: ({})",
                arg_types.join(", ")
            ),
            RuntimeError::MissingProperty { receiver, name } => {
                write!(f, "no such property: {name} for class: {receiver}")
            }
            RuntimeError::MissingConstructor {
                receiver,
                arg_types,
            } => write!(
                f,
                "could not find matching constructor for: {receiver}({})",
                arg_types.join(", ")
            ),
            RuntimeError::NullReceiver { name, property } => {
                if *property {
                    write!(f, "Cannot get property '{name}' on null object")
                } else {
                    write!(f, "Cannot invoke method {name}() on null object")
                }
            }
            RuntimeError::UnknownType(id) => write!(f, "unknown type id {id}"),
            RuntimeError::Coercion { expected, found } => {
                write!(f, "cannot cast object of type {found} to {expected}")
            }
            RuntimeError::Thrown { kind, message } => write!(f, "{kind}: {message}"),
            RuntimeError::InvalidSlot(index) => write!(f, "invalid call site slot {index}"),
            RuntimeError::Invocation(inner) => write!(f, "{inner}"),
        }
    }
}

impl std::error::Error for RuntimeError {}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
