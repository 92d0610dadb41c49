//! CoreAudio backend
//!
//! Device enumeration, the process input mute property and property
//! listeners go through the CoreAudio HAL. The gesture-capable view of
//! the mute state (and the AirPods stem-press handler) comes from
//! AVAudioApplication, available on macOS 14 and later.
//!
//! Property listener callbacks never receive a pointer to Rust state: the
//! client data is an integer key into [`HANDLERS`]. A callback that races
//! with unregistration finds no entry and does nothing.

use std::collections::HashMap;
use std::ffi::c_void;
use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use block2::RcBlock;
use core_foundation::base::TCFType;
use core_foundation::string::{CFString, CFStringRef};
use coreaudio_sys::{
    AudioObjectAddPropertyListener, AudioObjectGetPropertyData, AudioObjectGetPropertyDataSize,
    AudioObjectID, AudioObjectPropertyAddress, AudioObjectRemovePropertyListener,
    AudioObjectSetPropertyData, OSStatus, UInt32,
};
use objc2::runtime::Bool;
use objc2_avf_audio::AVAudioApplication;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{
    AudioDevice, AudioError, AudioSystem, DeviceId, GestureHandler, NotifyHandler, Registration,
};

const fn fourcc(code: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*code)
}

/// kAudioObjectSystemObject
const SYSTEM_OBJECT: AudioObjectID = 1;
/// kAudioObjectUnknown
const UNKNOWN_OBJECT: AudioObjectID = 0;

const SCOPE_GLOBAL: u32 = fourcc(b"glob");
const SCOPE_INPUT: u32 = fourcc(b"inpt");
const ELEMENT_MAIN: u32 = 0;

const HARDWARE_DEVICES: u32 = fourcc(b"dev#");
const HARDWARE_DEFAULT_INPUT: u32 = fourcc(b"dIn ");
const PROCESS_INPUT_MUTE: u32 = fourcc(b"pmin");
const OBJECT_NAME: u32 = fourcc(b"lnam");
const OBJECT_MANUFACTURER: u32 = fourcc(b"lmak");
const DEVICE_STREAMS: u32 = fourcc(b"stm#");

type ListenerFn = Arc<dyn Fn() + Send + Sync>;

static HANDLERS: Lazy<Mutex<HashMap<usize, ListenerFn>>> = Lazy::new(|| Mutex::new(HashMap::new()));
static NEXT_KEY: AtomicUsize = AtomicUsize::new(1);

fn address(selector: u32, scope: u32) -> AudioObjectPropertyAddress {
    AudioObjectPropertyAddress {
        mSelector: selector,
        mScope: scope,
        mElement: ELEMENT_MAIN,
    }
}

fn check(status: OSStatus, op: &'static str) -> Result<(), AudioError> {
    if status == 0 {
        Ok(())
    } else {
        Err(AudioError::Status { op, status })
    }
}

unsafe extern "C" fn property_listener(
    _object: AudioObjectID,
    _count: UInt32,
    _addresses: *const AudioObjectPropertyAddress,
    client_data: *mut c_void,
) -> OSStatus {
    let key = client_data as usize;
    let handler = HANDLERS.lock().get(&key).cloned();
    if let Some(handler) = handler {
        handler();
    }
    0
}

fn gesture_api_available() -> bool {
    objc2::available!(macos = 14.0)
}

/// CoreAudio + AVAudioApplication implementation of [`AudioSystem`]
#[derive(Debug, Default)]
pub struct CoreAudioSystem;

impl CoreAudioSystem {
    pub fn new() -> Self {
        Self
    }

    fn data_size(
        object: AudioObjectID,
        addr: &AudioObjectPropertyAddress,
        op: &'static str,
    ) -> Result<UInt32, AudioError> {
        let mut size: UInt32 = 0;
        let status =
            unsafe { AudioObjectGetPropertyDataSize(object, addr, 0, ptr::null(), &mut size) };
        check(status, op)?;
        Ok(size)
    }

    fn read_u32(
        object: AudioObjectID,
        addr: &AudioObjectPropertyAddress,
        op: &'static str,
    ) -> Result<u32, AudioError> {
        let mut value: u32 = 0;
        let mut size = mem::size_of::<u32>() as UInt32;
        let status = unsafe {
            AudioObjectGetPropertyData(
                object,
                addr,
                0,
                ptr::null(),
                &mut size,
                &mut value as *mut u32 as *mut c_void,
            )
        };
        check(status, op)?;
        Ok(value)
    }

    fn read_string(
        object: AudioObjectID,
        selector: u32,
        op: &'static str,
    ) -> Result<String, AudioError> {
        let addr = address(selector, SCOPE_GLOBAL);
        let mut value: CFStringRef = ptr::null();
        let mut size = mem::size_of::<CFStringRef>() as UInt32;
        let status = unsafe {
            AudioObjectGetPropertyData(
                object,
                &addr,
                0,
                ptr::null(),
                &mut size,
                &mut value as *mut CFStringRef as *mut c_void,
            )
        };
        check(status, op)?;
        if value.is_null() {
            return Ok(String::new());
        }
        // The HAL hands back a +1 reference
        let string = unsafe { CFString::wrap_under_create_rule(value) };
        Ok(string.to_string())
    }

    fn device_ids() -> Result<Vec<AudioObjectID>, AudioError> {
        let addr = address(HARDWARE_DEVICES, SCOPE_GLOBAL);
        let size = Self::data_size(SYSTEM_OBJECT, &addr, "device list size")?;
        let count = size as usize / mem::size_of::<AudioObjectID>();
        let mut ids: Vec<AudioObjectID> = vec![UNKNOWN_OBJECT; count];
        let mut size = (count * mem::size_of::<AudioObjectID>()) as UInt32;
        let status = unsafe {
            AudioObjectGetPropertyData(
                SYSTEM_OBJECT,
                &addr,
                0,
                ptr::null(),
                &mut size,
                ids.as_mut_ptr() as *mut c_void,
            )
        };
        check(status, "device list")?;
        // The list can shrink between the size query and the read
        ids.truncate(size as usize / mem::size_of::<AudioObjectID>());
        Ok(ids)
    }

    fn describe(id: AudioObjectID) -> Result<AudioDevice, AudioError> {
        let name = Self::read_string(id, OBJECT_NAME, "device name")?;
        let vendor =
            Self::read_string(id, OBJECT_MANUFACTURER, "device manufacturer").unwrap_or_default();
        let streams = address(DEVICE_STREAMS, SCOPE_INPUT);
        let supports_input = Self::data_size(id, &streams, "input streams").map(|size| size > 0)?;

        Ok(AudioDevice::new(id, name, vendor, supports_input))
    }

    /// Register one C listener for every address under a single table key
    fn listen(
        addresses: Vec<AudioObjectPropertyAddress>,
        handler: NotifyHandler,
        label: &'static str,
    ) -> Result<Registration, AudioError> {
        let key = NEXT_KEY.fetch_add(1, Ordering::Relaxed);
        HANDLERS.lock().insert(key, Arc::from(handler));

        let mut registered = Vec::with_capacity(addresses.len());
        for addr in &addresses {
            let status = unsafe {
                AudioObjectAddPropertyListener(
                    SYSTEM_OBJECT,
                    addr,
                    Some(property_listener),
                    key as *mut c_void,
                )
            };
            if let Err(e) = check(status, "add property listener") {
                Self::unlisten(key, &registered);
                return Err(e);
            }
            registered.push(*addr);
        }

        debug!(registration = label, key, "property listener registered");
        Ok(Registration::new(label, move || Self::unlisten(key, &registered)))
    }

    fn unlisten(key: usize, addresses: &[AudioObjectPropertyAddress]) {
        for addr in addresses {
            let status = unsafe {
                AudioObjectRemovePropertyListener(
                    SYSTEM_OBJECT,
                    addr,
                    Some(property_listener),
                    key as *mut c_void,
                )
            };
            if let Err(e) = check(status, "remove property listener") {
                warn!(error = %e, key, "failed to remove property listener");
            }
        }
        HANDLERS.lock().remove(&key);
    }
}

impl AudioSystem for CoreAudioSystem {
    fn devices(&self) -> Result<Vec<AudioDevice>, AudioError> {
        let mut devices = Vec::new();
        for id in Self::device_ids()? {
            match Self::describe(id) {
                Ok(device) => devices.push(device),
                // Devices can vanish mid-enumeration
                Err(e) => debug!(error = %e, id, "skipping device"),
            }
        }
        Ok(devices)
    }

    fn default_input_device(&self) -> Result<Option<DeviceId>, AudioError> {
        let addr = address(HARDWARE_DEFAULT_INPUT, SCOPE_GLOBAL);
        let id = Self::read_u32(SYSTEM_OBJECT, &addr, "default input device")?;
        Ok((id != UNKNOWN_OBJECT).then_some(DeviceId::Object(id)))
    }

    fn input_muted(&self) -> Result<bool, AudioError> {
        let addr = address(PROCESS_INPUT_MUTE, SCOPE_INPUT);
        Ok(Self::read_u32(SYSTEM_OBJECT, &addr, "read process input mute")? != 0)
    }

    fn set_input_muted(&self, muted: bool) -> Result<(), AudioError> {
        let addr = address(PROCESS_INPUT_MUTE, SCOPE_INPUT);
        let value: u32 = u32::from(muted);
        let status = unsafe {
            AudioObjectSetPropertyData(
                SYSTEM_OBJECT,
                &addr,
                0,
                ptr::null(),
                mem::size_of::<u32>() as UInt32,
                &value as *const u32 as *const c_void,
            )
        };
        check(status, "set process input mute")?;

        if gesture_api_available() {
            let app = unsafe { AVAudioApplication::sharedInstance() };
            if let Err(err) = unsafe { app.setInputMuted_error(muted) } {
                warn!(
                    error = %err.localizedDescription(),
                    "AVAudioApplication rejected input mute"
                );
            }
        }
        Ok(())
    }

    fn gesture_muted(&self) -> Option<bool> {
        if !gesture_api_available() {
            return None;
        }
        let app = unsafe { AVAudioApplication::sharedInstance() };
        Some(unsafe { app.isInputMuted() })
    }

    fn on_gesture(&self, handler: GestureHandler) -> Result<Registration, AudioError> {
        if !gesture_api_available() {
            return Err(AudioError::Unsupported("input mute gesture handler (requires macOS 14)"));
        }

        let handler: Arc<dyn Fn(bool) + Send + Sync> = Arc::from(handler);
        let block = RcBlock::new(move |muted: Bool| -> Bool {
            handler(muted.as_bool());
            Bool::YES
        });

        let app = unsafe { AVAudioApplication::sharedInstance() };
        unsafe { app.setInputMuteStateChangeHandler_error(Some(&*block)) }.map_err(|err| {
            warn!(error = %err.localizedDescription(), "failed to install gesture handler");
            AudioError::Unsupported("input mute gesture handler")
        })?;

        Ok(Registration::new("gesture", || {
            let app = unsafe { AVAudioApplication::sharedInstance() };
            if let Err(err) = unsafe { app.setInputMuteStateChangeHandler_error(None) } {
                warn!(error = %err.localizedDescription(), "failed to remove gesture handler");
            }
        }))
    }

    fn on_mute_changed(&self, handler: NotifyHandler) -> Result<Registration, AudioError> {
        Self::listen(
            vec![address(PROCESS_INPUT_MUTE, SCOPE_INPUT)],
            handler,
            "mute_changed",
        )
    }

    fn on_topology_changed(&self, handler: NotifyHandler) -> Result<Registration, AudioError> {
        Self::listen(
            vec![
                address(HARDWARE_DEVICES, SCOPE_GLOBAL),
                address(HARDWARE_DEFAULT_INPUT, SCOPE_GLOBAL),
            ],
            handler,
            "topology",
        )
    }
}
