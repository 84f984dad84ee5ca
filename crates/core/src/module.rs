// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Modules: factories of media nodes.
//!
//! A module is registered once with a [`Core`]. When a stream needs a node,
//! the core asks every module to [`probe`](Module::probe) a
//! [`MediaNodeConstructor`] and instantiates the node from the best scorer.

use crate::core::Core;
use crate::error::{Result, TuneKitError};
use crate::media::{MediaType, MEDIA_TYPE_ID_UNKNOWN};
use crate::node::MediaNode;
use crate::port::{MediaPortInterfaceSpec, PortProtocol};
use crate::properties::PropertyValue;
use std::fmt;

/// Probe score bands. Higher wins.
#[derive(Debug)]
pub struct ProbeMatch;

impl ProbeMatch {
    /// The module can do the job but has no particular claim to it.
    pub const DEFAULT: u8 = 0;
    pub const MIN: u8 = 1;
    pub const LOW: u8 = 64;
    pub const MEDIUM: u8 = 128;
    pub const HIGH: u8 = 192;
    pub const MAX: u8 = 253;
    /// The constructor names this module.
    pub const EXACT: u8 = 254;
    pub const FORCE: u8 = 255;
}

/// A 16-byte module identifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ModuleId(pub [u8; 16]);

impl ModuleId {
    /// Builds an id from an ASCII tag, zero padded or truncated to 16 bytes.
    pub fn from_tag(tag: &str) -> Self {
        let mut id = [0u8; 16];
        for (dst, src) in id.iter_mut().zip(tag.bytes()) {
            *dst = src;
        }
        Self(id)
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Static description of a module.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleInfo {
    pub name: String,
    pub id: ModuleId,
    pub flags: u32,
    /// Diagnostic key/value pairs (version, supported formats, ...).
    pub properties: Vec<(String, PropertyValue)>,
}

impl ModuleInfo {
    pub fn new(name: impl Into<String>, id: ModuleId) -> Self {
        Self { name: name.into(), id, flags: 0, properties: Vec::new() }
    }

    #[must_use]
    pub fn with_property(
        mut self,
        name: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Self {
        self.properties.push((name.into(), value.into()));
        self
    }
}

/// Requested input and output interfaces of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaNodeSpec {
    pub input: MediaPortInterfaceSpec,
    pub output: MediaPortInterfaceSpec,
}

/// A node construction request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaNodeConstructor {
    /// Module name, file path, URL... `None` lets any module volunteer.
    pub name: Option<String>,
    pub spec: MediaNodeSpec,
}

impl MediaNodeConstructor {
    pub fn new(
        name: Option<&str>,
        input: MediaPortInterfaceSpec,
        output: MediaPortInterfaceSpec,
    ) -> Self {
        Self { name: name.map(str::to_string), spec: MediaNodeSpec { input, output } }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub const fn input_type(&self) -> &MediaType {
        &self.spec.input.media_type
    }

    pub const fn output_type(&self) -> &MediaType {
        &self.spec.output.media_type
    }
}

/// A node factory.
pub trait Module: Send + Sync {
    fn info(&self) -> ModuleInfo;

    fn name(&self) -> String {
        self.info().name
    }

    /// Called right after registration, typically to register media types and
    /// file extensions. A failure undoes the registration.
    fn attach(&self, _core: &Core) -> Result<()> {
        Ok(())
    }

    /// Scores how well this module serves `constructor`.
    ///
    /// # Errors
    ///
    /// Any error means "no match".
    fn probe(&self, core: &Core, constructor: &MediaNodeConstructor) -> Result<u8>;

    fn create_instance(
        &self,
        core: &Core,
        constructor: &MediaNodeConstructor,
    ) -> Result<Box<dyn MediaNode>>;
}

impl fmt::Debug for dyn Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module").field("name", &self.name()).finish()
    }
}

fn reject(module: &str, reason: impl fmt::Display) -> TuneKitError {
    TuneKitError::InvalidParameters(format!("{module}: {reason}"))
}

/// The standard probe rules shared by built-in modules.
///
/// 1. A requested protocol other than `Any` must equal the module's.
/// 2. The input type id must match what the module consumes.
/// 3. An output type id, when specified, must be `UNKNOWN` or what the module produces.
/// 4. A constructor name must equal the module name, scoring `EXACT`.
/// 5. Without a name the module scores `default_score`, or rejects when that is `None`.
#[derive(Debug, Clone)]
pub struct ProbePolicy<'a> {
    pub module: &'a str,
    pub input_protocol: PortProtocol,
    pub output_protocol: PortProtocol,
    /// `None` accepts any input type.
    pub input_type: Option<u32>,
    /// `None` accepts any output type.
    pub output_type: Option<u32>,
    pub default_score: Option<u8>,
}

impl ProbePolicy<'_> {
    /// Applies rules 1 to 3.
    ///
    /// # Errors
    ///
    /// `InvalidParameters` describing the first violated rule.
    pub fn check_interface(&self, constructor: &MediaNodeConstructor) -> Result<()> {
        let spec = &constructor.spec;
        if !spec.input.protocol.accepts(self.input_protocol) {
            return Err(reject(self.module, format_args!("input protocol {}", spec.input.protocol)));
        }
        if !spec.output.protocol.accepts(self.output_protocol) {
            return Err(reject(
                self.module,
                format_args!("output protocol {}", spec.output.protocol),
            ));
        }
        if let Some(id) = self.input_type {
            if spec.input.media_type.id != id {
                return Err(reject(
                    self.module,
                    format_args!("input type {}", spec.input.media_type.id),
                ));
            }
        }
        if let Some(id) = self.output_type {
            let requested = spec.output.media_type.id;
            if requested != MEDIA_TYPE_ID_UNKNOWN && requested != id {
                return Err(reject(self.module, format_args!("output type {requested}")));
            }
        }
        Ok(())
    }

    /// Applies rules 4 and 5.
    ///
    /// # Errors
    ///
    /// `InvalidParameters` on a name mismatch, or when a name is required.
    pub fn score_name(&self, constructor: &MediaNodeConstructor) -> Result<u8> {
        match (constructor.name(), self.default_score) {
            (Some(name), _) if name == self.module => Ok(ProbeMatch::EXACT),
            (Some(name), _) => Err(reject(self.module, format_args!("name '{name}'"))),
            (None, Some(score)) => Ok(score),
            (None, None) => Err(reject(self.module, "a name is required")),
        }
    }

    /// Applies every rule.
    ///
    /// # Errors
    ///
    /// See [`Self::check_interface`] and [`Self::score_name`].
    pub fn evaluate(&self, constructor: &MediaNodeConstructor) -> Result<u8> {
        self.check_interface(constructor)?;
        self.score_name(constructor)
    }
}
