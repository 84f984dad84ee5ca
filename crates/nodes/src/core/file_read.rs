// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! File input - Serves a file on disk as a byte stream

use tunekit_core::byte_stream::{FileInputStream, InputStream, SharedInputStream};
use tunekit_core::context::{StreamContext, StreamInfo, StreamInfoMask};
use tunekit_core::module::{
    MediaNodeConstructor, Module, ModuleId, ModuleInfo, ProbeMatch, ProbePolicy,
};
use tunekit_core::node::{MediaNode, MediaNodeInfo};
use tunekit_core::port::{MediaPort, PortProtocol};
use tunekit_core::{Core, MediaType, Result, TuneKitError};

pub const FILE_INPUT_MODULE: &str = "FileInput";

const FILE_PREFIX: &str = "file:";

/// Creates [`FileInput`] nodes for `file:` URLs and plain paths.
#[derive(Debug, Default)]
pub struct FileInputModule;

impl FileInputModule {
    const fn policy() -> ProbePolicy<'static> {
        ProbePolicy {
            module: FILE_INPUT_MODULE,
            input_protocol: PortProtocol::None,
            output_protocol: PortProtocol::StreamPull,
            input_type: None,
            output_type: None,
            default_score: None,
        }
    }
}

impl Module for FileInputModule {
    fn info(&self) -> ModuleInfo {
        ModuleInfo::new(FILE_INPUT_MODULE, ModuleId::from_tag(FILE_INPUT_MODULE))
            .with_property("url_scheme", FILE_PREFIX)
    }

    fn probe(&self, _core: &Core, constructor: &MediaNodeConstructor) -> Result<u8> {
        let name = constructor
            .name()
            .ok_or_else(|| TuneKitError::InvalidParameters("file input needs a name".into()))?;
        Self::policy().check_interface(constructor)?;

        if name.starts_with(FILE_PREFIX) {
            Ok(ProbeMatch::EXACT)
        } else if constructor.spec.input.protocol == PortProtocol::None {
            // any other name may still be a path
            Ok(ProbeMatch::DEFAULT)
        } else {
            Err(TuneKitError::InvalidParameters(format!("'{name}' is not a file input")))
        }
    }

    fn create_instance(
        &self,
        core: &Core,
        constructor: &MediaNodeConstructor,
    ) -> Result<Box<dyn MediaNode>> {
        let name = constructor
            .name()
            .ok_or_else(|| TuneKitError::InvalidParameters("file input needs a name".into()))?;
        let path = name.strip_prefix(FILE_PREFIX).unwrap_or(name);
        let mut stream = FileInputStream::open(path)?;
        let size = stream.size()?;

        let media_type = if constructor.output_type().is_unknown() {
            core.registry()
                .media_type_id_for_path(path)
                .map_or_else(|_| MediaType::unknown(), MediaType::new)
        } else {
            constructor.output_type().clone()
        };
        tracing::debug!(path, media_type = %media_type, size, "file input opened");

        Ok(Box::new(FileInput {
            path: path.to_string(),
            stream: SharedInputStream::new(stream),
            media_type,
            size,
        }))
    }
}

/// A node with a single STREAM_PULL output serving a file.
pub struct FileInput {
    path: String,
    stream: SharedInputStream,
    media_type: MediaType,
    size: Option<u64>,
}

impl MediaNode for FileInput {
    fn info(&self) -> MediaNodeInfo {
        MediaNodeInfo { module: FILE_INPUT_MODULE.to_string(), name: Some(self.path.clone()) }
    }

    fn ports(&self) -> Vec<MediaPort> {
        vec![MediaPort::output(PortProtocol::StreamPull, [self.media_type.clone()])]
    }

    fn activate(&mut self, context: &StreamContext) -> Result<()> {
        if let Some(size) = self.size {
            context.set_info(&StreamInfo {
                mask: StreamInfoMask::SIZE,
                size,
                ..StreamInfo::default()
            });
        }
        Ok(())
    }

    fn get_stream(&mut self, _port: &str) -> Result<(SharedInputStream, MediaType)> {
        Ok((self.stream.clone(), self.media_type.clone()))
    }
}
