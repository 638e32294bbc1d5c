#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SiteKind {
    Call = 0,
    CallCurrent = 1,
    CallStatic = 2,
    CallConstructor = 3,
    GetProperty = 4,
}

pub const MANIFEST_VERSION: u16 = 1;

/// Largest argument count served by the fixed-arity entry points; longer
/// argument lists go through the slice form.
pub const MAX_FIXED_ARITY: usize = 4;

pub const SITE_KINDS: [SiteKind; 5] = [
    SiteKind::Call,
    SiteKind::CallCurrent,
    SiteKind::CallStatic,
    SiteKind::CallConstructor,
    SiteKind::GetProperty,
];

impl SiteKind {
    pub fn mnemonic(self) -> &'static str {
        match self {
            SiteKind::Call => "call",
            SiteKind::CallCurrent => "call.current",
            SiteKind::CallStatic => "call.static",
            SiteKind::CallConstructor => "call.new",
            SiteKind::GetProperty => "getprop",
        }
    }

    pub fn parse_mnemonic(text: &str) -> Option<Self> {
        match text {
            "call" => Some(SiteKind::Call),
            "call.current" => Some(SiteKind::CallCurrent),
            "call.static" => Some(SiteKind::CallStatic),
            "call.new" => Some(SiteKind::CallConstructor),
            "getprop" => Some(SiteKind::GetProperty),
            _ => None,
        }
    }

    pub fn from_u8(code: u8) -> Option<Self> {
        SITE_KINDS.get(code as usize).copied()
    }

    /// Whether the receiver of this kind of site is a class literal rather
    /// than an arbitrary value.
    pub fn takes_type_receiver(self) -> bool {
        matches!(self, SiteKind::CallStatic | SiteKind::CallConstructor)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallSiteDescriptor {
    pub index: u16,
    pub name: String,
    pub kind: SiteKind,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallSiteManifest {
    pub owner: String,
    pub sites: Vec<CallSiteDescriptor>,
}

impl CallSiteManifest {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            sites: Vec::new(),
        }
    }

    /// Appends a slot and returns its index. Every invocation expression gets
    /// its own slot, so equal names are not merged.
    pub fn push(&mut self, name: impl Into<String>, kind: SiteKind) -> Option<u16> {
        let index = u16::try_from(self.sites.len()).ok()?;
        self.sites.push(CallSiteDescriptor {
            index,
            name: name.into(),
            kind,
        });
        Some(index)
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn get(&self, index: u16) -> Option<&CallSiteDescriptor> {
        self.sites.get(index as usize)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sites.iter().map(|site| site.name.as_str())
    }

    pub fn is_dense(&self) -> bool {
        self.sites
            .iter()
            .enumerate()
            .all(|(position, site)| site.index as usize == position)
    }

    /// One line per slot: `<index> <mnemonic> <name>`.
    pub fn render(&self) -> String {
        let mut out = format!("; call sites v{MANIFEST_VERSION} owner={}\n", self.owner);
        for site in &self.sites {
            out.push_str(&format!(
                "{} {} {}\n",
                site.index,
                site.kind.mnemonic(),
                site.name
            ));
        }
        out
    }
}
