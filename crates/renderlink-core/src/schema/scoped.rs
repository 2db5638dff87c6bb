// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The C-layout schema tree handed across the router boundary.
//!
//! Every string is a NUL-terminated heap copy and every array a boxed slice,
//! both produced by this module. [`ScopedSchema`] owns the whole tree: it is
//! move-only, and releasing it (explicitly, on drop, or when assigned over)
//! frees each allocation exactly once and leaves the tree empty.

use std::ffi::{c_char, CStr, CString};
use std::fmt;
use std::ptr;

use super::{ParameterSchema, SceneSchema, Schema, SchemaError};

/// A parameter as laid out across the boundary.
#[derive(Debug)]
#[repr(C)]
pub struct RawParameter {
    /// Grouping shown by the router.
    pub group: *const c_char,
    /// Human readable name.
    pub display_name: *const c_char,
    /// Unique key within the scene.
    pub key: *const c_char,
    /// Lower bound.
    pub min: f32,
    /// Upper bound.
    pub max: f32,
    /// Step between values.
    pub step: f32,
    /// Default value.
    pub default_value: f32,
    /// Number of entries in `options`.
    pub n_options: u32,
    /// Option labels.
    pub options: *mut *const c_char,
    /// DMX routing offset.
    pub dmx_offset: i32,
    /// DMX routing value type.
    pub dmx_type: u32,
}

/// A scene as laid out across the boundary.
#[derive(Debug)]
#[repr(C)]
pub struct RawScene {
    /// The scene name.
    pub name: *const c_char,
    /// Number of entries in `parameters`.
    pub n_parameters: u32,
    /// The parameters.
    pub parameters: *mut RawParameter,
    /// Content hash of the parameters.
    pub hash: u64,
}

/// The channel list as laid out across the boundary.
#[derive(Debug)]
#[repr(C)]
pub struct RawChannels {
    /// Number of entries in `channels`.
    pub n_channels: u32,
    /// Channel names.
    pub channels: *mut *const c_char,
}

/// The scene list as laid out across the boundary.
#[derive(Debug)]
#[repr(C)]
pub struct RawScenes {
    /// Number of entries in `scenes`.
    pub n_scenes: u32,
    /// The scenes.
    pub scenes: *mut RawScene,
}

/// A schema as laid out across the boundary.
#[derive(Debug)]
#[repr(C)]
pub struct RawSchema {
    /// The declared channels.
    pub channels: RawChannels,
    /// The declared scenes.
    pub scenes: RawScenes,
}

impl RawSchema {
    const EMPTY: RawSchema = RawSchema {
        channels: RawChannels {
            n_channels: 0,
            channels: ptr::null_mut(),
        },
        scenes: RawScenes {
            n_scenes: 0,
            scenes: ptr::null_mut(),
        },
    };
}

/// Owner of a [`RawSchema`] tree.
pub struct ScopedSchema {
    raw: RawSchema,
}

// SAFETY: the tree is exclusively owned and never aliased; moving it to another
// thread moves every allocation with it.
unsafe impl Send for ScopedSchema {}

impl ScopedSchema {
    /// Creates an empty tree.
    pub const fn new() -> Self {
        Self {
            raw: RawSchema::EMPTY,
        }
    }

    /// Deep-copies `schema` into a freshly allocated tree.
    ///
    /// ## Errors
    /// * `SchemaError::InteriorNul` - A string cannot be NUL-terminated.
    /// * `SchemaError::TooManyEntries` - A sequence does not fit a 32-bit count.
    pub fn build(schema: &Schema) -> Result<Self, SchemaError> {
        // Everything fallible happens on owned values first, so an error leaves
        // nothing half-converted behind.
        let staged = StagedSchema::stage(schema)?;
        Ok(Self {
            raw: staged.into_raw(),
        })
    }

    /// Reads the tree back into the owned model.
    pub fn to_schema(&self) -> Result<Schema, SchemaError> {
        let mut schema = Schema::default();

        // SAFETY: pointers and counts were produced together by `StagedSchema::into_raw`
        // and stay valid until `release`.
        unsafe {
            for &channel in raw_slice(self.raw.channels.n_channels, self.raw.channels.channels) {
                schema.channels.insert(read_string(channel, "channel")?);
            }
            for scene in raw_slice(self.raw.scenes.n_scenes, self.raw.scenes.scenes) {
                let mut parameters = Vec::with_capacity(scene.n_parameters as usize);
                for parameter in raw_slice(scene.n_parameters, scene.parameters) {
                    let options = raw_slice(parameter.n_options, parameter.options)
                        .iter()
                        .map(|&option| read_string(option, "option"))
                        .collect::<Result<Vec<_>, _>>()?;
                    parameters.push(ParameterSchema {
                        group: read_string(parameter.group, "group")?,
                        display_name: read_string(parameter.display_name, "display name")?,
                        key: read_string(parameter.key, "key")?,
                        min: parameter.min,
                        max: parameter.max,
                        step: parameter.step,
                        default_value: parameter.default_value,
                        options,
                        dmx_offset: parameter.dmx_offset,
                        dmx_type: parameter.dmx_type,
                    });
                }
                schema.scenes.push(SceneSchema {
                    name: read_string(scene.name, "scene name")?,
                    parameters,
                    hash: scene.hash,
                });
            }
        }

        Ok(schema)
    }

    /// Frees every allocation and resets the tree to empty. Calling it on an
    /// empty tree does nothing.
    pub fn release(&mut self) {
        let raw = std::mem::replace(&mut self.raw, RawSchema::EMPTY);
        // SAFETY: `raw` was produced by `StagedSchema::into_raw` (or is empty) and has
        // just been detached from `self`, so nothing else can free it again.
        unsafe { free_raw_schema(raw) };
    }

    /// Hands the whole tree over, leaving `self` empty.
    pub fn take(&mut self) -> ScopedSchema {
        std::mem::take(self)
    }

    /// Returns `true` if the tree holds no channels and no scenes.
    pub fn is_empty(&self) -> bool {
        self.raw.channels.n_channels == 0 && self.raw.scenes.n_scenes == 0
    }

    /// Number of channels.
    pub fn channel_count(&self) -> usize {
        self.raw.channels.n_channels as usize
    }

    /// Number of scenes.
    pub fn scene_count(&self) -> usize {
        self.raw.scenes.n_scenes as usize
    }

    /// Hash of scene `index`.
    pub fn scene_hash(&self, index: usize) -> Option<u64> {
        // SAFETY: see `to_schema`.
        unsafe { raw_slice(self.raw.scenes.n_scenes, self.raw.scenes.scenes) }
            .get(index)
            .map(|scene| scene.hash)
    }

    /// Overwrites the hash of scene `index`. Returns `false` if out of range.
    pub fn set_scene_hash(&mut self, index: usize, hash: u64) -> bool {
        if index >= self.scene_count() {
            return false;
        }
        // SAFETY: `index` is in bounds of the scene array owned by `self`.
        unsafe { (*self.raw.scenes.scenes.add(index)).hash = hash };
        true
    }

    /// The tree in its boundary layout, for handing to a native binding that only reads it.
    pub fn as_raw(&self) -> &RawSchema {
        &self.raw
    }
}

impl Default for ScopedSchema {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ScopedSchema {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for ScopedSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedSchema")
            .field("channels", &self.raw.channels.n_channels)
            .field("scenes", &self.raw.scenes.n_scenes)
            .finish()
    }
}

struct StagedParameter {
    group: CString,
    display_name: CString,
    key: CString,
    min: f32,
    max: f32,
    step: f32,
    default_value: f32,
    options: Vec<CString>,
    dmx_offset: i32,
    dmx_type: u32,
}

struct StagedScene {
    name: CString,
    parameters: Vec<StagedParameter>,
    hash: u64,
}

struct StagedSchema {
    channels: Vec<CString>,
    scenes: Vec<StagedScene>,
}

impl StagedSchema {
    fn stage(schema: &Schema) -> Result<Self, SchemaError> {
        check_count(schema.channels.len(), "channels")?;
        check_count(schema.scenes.len(), "scenes")?;

        let channels = schema
            .channels
            .iter()
            .map(|channel| c_string(channel, "channel"))
            .collect::<Result<Vec<_>, _>>()?;

        let mut scenes = Vec::with_capacity(schema.scenes.len());
        for scene in &schema.scenes {
            check_count(scene.parameters.len(), "parameters")?;
            let mut parameters = Vec::with_capacity(scene.parameters.len());
            for parameter in &scene.parameters {
                check_count(parameter.options.len(), "options")?;
                parameters.push(StagedParameter {
                    group: c_string(&parameter.group, "group")?,
                    display_name: c_string(&parameter.display_name, "display name")?,
                    key: c_string(&parameter.key, "key")?,
                    min: parameter.min,
                    max: parameter.max,
                    step: parameter.step,
                    default_value: parameter.default_value,
                    options: parameter
                        .options
                        .iter()
                        .map(|option| c_string(option, "option"))
                        .collect::<Result<Vec<_>, _>>()?,
                    dmx_offset: parameter.dmx_offset,
                    dmx_type: parameter.dmx_type,
                });
            }
            scenes.push(StagedScene {
                name: c_string(&scene.name, "scene name")?,
                parameters,
                hash: scene.hash,
            });
        }

        Ok(Self { channels, scenes })
    }

    /// Infallible: all counts were checked by `stage`.
    fn into_raw(self) -> RawSchema {
        let channels = self.channels.into_iter().map(into_raw_string).collect();
        let (n_channels, channels) = into_raw_array(channels);

        let scenes = self
            .scenes
            .into_iter()
            .map(|scene| {
                let parameters = scene
                    .parameters
                    .into_iter()
                    .map(|parameter| {
                        let options = parameter.options.into_iter().map(into_raw_string).collect();
                        let (n_options, options) = into_raw_array(options);
                        RawParameter {
                            group: into_raw_string(parameter.group),
                            display_name: into_raw_string(parameter.display_name),
                            key: into_raw_string(parameter.key),
                            min: parameter.min,
                            max: parameter.max,
                            step: parameter.step,
                            default_value: parameter.default_value,
                            n_options,
                            options,
                            dmx_offset: parameter.dmx_offset,
                            dmx_type: parameter.dmx_type,
                        }
                    })
                    .collect();
                let (n_parameters, parameters) = into_raw_array(parameters);
                RawScene {
                    name: into_raw_string(scene.name),
                    n_parameters,
                    parameters,
                    hash: scene.hash,
                }
            })
            .collect();
        let (n_scenes, scenes) = into_raw_array(scenes);

        RawSchema {
            channels: RawChannels {
                n_channels,
                channels,
            },
            scenes: RawScenes { n_scenes, scenes },
        }
    }
}

fn check_count(len: usize, what: &'static str) -> Result<(), SchemaError> {
    u32::try_from(len)
        .map(|_| ())
        .map_err(|_| SchemaError::TooManyEntries(what))
}

fn c_string(text: &str, field: &'static str) -> Result<CString, SchemaError> {
    CString::new(text).map_err(|_| SchemaError::InteriorNul { field })
}

fn into_raw_string(text: CString) -> *const c_char {
    text.into_raw().cast_const()
}

/// Empty arrays are represented by a null pointer.
fn into_raw_array<T>(items: Vec<T>) -> (u32, *mut T) {
    if items.is_empty() {
        return (0, ptr::null_mut());
    }
    let len = items.len() as u32;
    let slice: *mut [T] = Box::into_raw(items.into_boxed_slice());
    (len, slice.cast::<T>())
}

/// # Safety
/// `ptr` must be null or come from `into_raw_string` and not have been freed.
unsafe fn free_string(ptr: *const c_char) {
    if !ptr.is_null() {
        drop(unsafe { CString::from_raw(ptr.cast_mut()) });
    }
}

/// # Safety
/// `ptr`/`len` must be null/0 or come from one `into_raw_array` call and not have been freed.
unsafe fn take_array<T>(len: u32, ptr: *mut T) -> Box<[T]> {
    if ptr.is_null() {
        return Box::default();
    }
    unsafe { Box::from_raw(ptr::slice_from_raw_parts_mut(ptr, len as usize)) }
}

/// # Safety
/// Same contract as `take_array`; the returned slice must not outlive the array.
unsafe fn raw_slice<'a, T>(len: u32, ptr: *const T) -> &'a [T] {
    if ptr.is_null() {
        return &[];
    }
    unsafe { std::slice::from_raw_parts(ptr, len as usize) }
}

/// # Safety
/// `ptr` must be null or point to a live NUL-terminated string.
unsafe fn read_string(ptr: *const c_char, field: &'static str) -> Result<String, SchemaError> {
    if ptr.is_null() {
        return Ok(String::new());
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map(str::to_owned)
        .map_err(|_| SchemaError::InvalidUtf8 { field })
}

/// # Safety
/// `raw` must be empty or produced by `StagedSchema::into_raw`, and must not be freed twice.
unsafe fn free_raw_schema(raw: RawSchema) {
    unsafe {
        for channel in take_array(raw.channels.n_channels, raw.channels.channels).iter() {
            free_string(*channel);
        }
        for scene in take_array(raw.scenes.n_scenes, raw.scenes.scenes).iter() {
            free_string(scene.name);
            for parameter in take_array(scene.n_parameters, scene.parameters).iter() {
                free_string(parameter.group);
                free_string(parameter.display_name);
                free_string(parameter.key);
                for option in take_array(parameter.n_options, parameter.options).iter() {
                    free_string(*option);
                }
            }
        }
    }
}
