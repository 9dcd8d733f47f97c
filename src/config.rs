//! Volume and cache configuration.

use crate::block::layout::BlockLayout;
use bitflags::bitflags;

bitflags! {
    /// Feature flags reported by get-volume-info.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VolumeFeatures: u32 {
        const CASE_SENSITIVE_SEARCH = 1 << 0;
        const CASE_PRESERVED_NAMES  = 1 << 1;
        const UNICODE_ON_DISK       = 1 << 2;
        const READ_ONLY_VOLUME      = 1 << 3;
        const VOLUME_IS_COMPRESSED  = 1 << 4;
    }
}

/// Static volume metadata surfaced to the protocol.
#[derive(Debug, Clone)]
pub struct VolumeOptions {
    pub label: String,
    pub fs_name: String,
    pub max_component_length: u32,
    pub features: VolumeFeatures,
}

impl Default for VolumeOptions {
    fn default() -> Self {
        Self {
            label: "blockvfs".to_string(),
            fs_name: "blockvfs".to_string(),
            max_component_length: 256,
            features: VolumeFeatures::CASE_PRESERVED_NAMES | VolumeFeatures::UNICODE_ON_DISK,
        }
    }
}

/// Top-level construction options for a [`crate::vfs::Vfs`].
#[derive(Debug, Clone)]
pub struct VfsOptions {
    pub layout: BlockLayout,
    /// Total byte budget of the shared block cache.
    pub cache_capacity: u64,
    pub volume: VolumeOptions,
}

impl Default for VfsOptions {
    fn default() -> Self {
        Self {
            layout: BlockLayout::default(),
            cache_capacity: 250 * 1024 * 1024,
            volume: VolumeOptions::default(),
        }
    }
}
