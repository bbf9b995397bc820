use std::{
    ffi::{c_void, CStr},
    os::raw::c_char,
};

use ash::{extensions::ext, vk};
use tracing::Level;

use crate::Result;

const NAME_INLINE_CAPACITY: usize = 64;

unsafe fn str_or_empty<'a>(ptr: *const c_char) -> &'a CStr {
    if ptr.is_null() {
        c""
    } else {
        unsafe { CStr::from_ptr(ptr) }
    }
}

/// Log level of a validation message.
fn message_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> Level {
    use vk::DebugUtilsMessageSeverityFlagsEXT as S;
    if severity.contains(S::ERROR) {
        Level::ERROR
    } else if severity.contains(S::WARNING) {
        Level::WARN
    } else if severity.contains(S::INFO) {
        Level::DEBUG
    } else {
        Level::TRACE
    }
}

/// Names of the objects a message refers to, for objects that were named.
unsafe fn named_objects(data: &vk::DebugUtilsMessengerCallbackDataEXT) -> String {
    if data.p_objects.is_null() || data.object_count == 0 {
        return String::new();
    }
    let objects = unsafe { std::slice::from_raw_parts(data.p_objects, data.object_count as usize) };
    let mut names = String::new();
    for object in objects.iter().filter(|o| !o.p_object_name.is_null()) {
        let name = unsafe { CStr::from_ptr(object.p_object_name) }.to_string_lossy();
        if !names.is_empty() {
            names.push_str(", ");
        }
        names.push_str(&format!("{:?} {:?}", object.object_type, name));
    }
    names
}

unsafe extern "system" fn messenger_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    if std::thread::panicking() || p_callback_data.is_null() {
        return vk::FALSE;
    }
    let data = unsafe { &*p_callback_data };
    let id = unsafe { str_or_empty(data.p_message_id_name) }.to_string_lossy();
    let message = unsafe { str_or_empty(data.p_message) }.to_string_lossy();
    let objects = unsafe { named_objects(data) };

    macro_rules! forward {
        ($level:expr) => {
            tracing::event!(
                $level,
                "Vk[{message_type:?} {id}] {message} [{objects}]"
            )
        };
    }
    match message_level(severity) {
        Level::ERROR => forward!(Level::ERROR),
        Level::WARN => forward!(Level::WARN),
        Level::DEBUG => forward!(Level::DEBUG),
        _ => forward!(Level::TRACE),
    }
    vk::FALSE
}

/// Nul-terminated copy of a name; short names stay on the stack.
struct NameBuf {
    inline: [u8; NAME_INLINE_CAPACITY],
    heap: Vec<u8>,
}

impl NameBuf {
    #[inline]
    const fn new() -> Self {
        Self {
            inline: [0; NAME_INLINE_CAPACITY],
            heap: Vec::new(),
        }
    }

    /// Interior nul bytes truncate the name.
    fn c_str<'a>(&'a mut self, name: &'a str) -> &'a CStr {
        let bytes = name.as_bytes();
        let bytes = match bytes.iter().position(|&b| b == 0) {
            Some(nul) => return CStr::from_bytes_until_nul(&bytes[..=nul]).unwrap_or(c""),
            None => bytes,
        };
        let buf = if bytes.len() < NAME_INLINE_CAPACITY {
            &mut self.inline[..=bytes.len()]
        } else {
            self.heap.clear();
            self.heap.resize(bytes.len() + 1, 0);
            &mut self.heap[..]
        };
        buf[..bytes.len()].copy_from_slice(bytes);
        buf[bytes.len()] = 0;
        CStr::from_bytes_until_nul(buf).unwrap_or(c"")
    }
}

/// `VK_EXT_debug_utils`: the validation messenger, object names and
/// command buffer labels.
pub struct DebugUtils {
    functions: ext::DebugUtils,
    messenger: vk::DebugUtilsMessengerEXT,
}

impl DebugUtils {
    pub const fn name() -> &'static CStr {
        ext::DebugUtils::name()
    }

    /// Installs the messenger only when `forward_validation` is set.
    pub fn new(
        entry: &ash::Entry,
        instance: &ash::Instance,
        forward_validation: bool,
    ) -> Result<Self> {
        let functions = ext::DebugUtils::new(entry, instance);
        let messenger = if forward_validation {
            let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
                .message_severity(
                    vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                        | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
                )
                .message_type(
                    vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                        | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                )
                .pfn_user_callback(Some(messenger_callback));
            unsafe { functions.create_debug_utils_messenger(&create_info, None)? }
        } else {
            vk::DebugUtilsMessengerEXT::null()
        };
        Ok(Self {
            functions,
            messenger,
        })
    }

    pub unsafe fn set_object_name<H: vk::Handle>(&self, device: vk::Device, handle: H, name: &str) {
        let raw = handle.as_raw();
        if raw == 0 {
            return;
        }
        let mut buf = NameBuf::new();
        let info = vk::DebugUtilsObjectNameInfoEXT::builder()
            .object_type(H::TYPE)
            .object_handle(raw)
            .object_name(buf.c_str(name));
        // naming is best effort
        let _ = unsafe { self.functions.set_debug_utils_object_name(device, &info) };
    }

    pub unsafe fn begin_label(&self, cmd: vk::CommandBuffer, name: &str, color: [f32; 3]) {
        let mut buf = NameBuf::new();
        let label = vk::DebugUtilsLabelEXT::builder()
            .label_name(buf.c_str(name))
            .color([color[0], color[1], color[2], 1.0]);
        unsafe { self.functions.cmd_begin_debug_utils_label(cmd, &label) };
    }

    pub unsafe fn insert_label(&self, cmd: vk::CommandBuffer, name: &str, color: [f32; 3]) {
        let mut buf = NameBuf::new();
        let label = vk::DebugUtilsLabelEXT::builder()
            .label_name(buf.c_str(name))
            .color([color[0], color[1], color[2], 1.0]);
        unsafe { self.functions.cmd_insert_debug_utils_label(cmd, &label) };
    }

    #[inline]
    pub unsafe fn end_label(&self, cmd: vk::CommandBuffer) {
        unsafe { self.functions.cmd_end_debug_utils_label(cmd) };
    }
}

impl Drop for DebugUtils {
    fn drop(&mut self) {
        let messenger = std::mem::take(&mut self.messenger);
        if messenger != vk::DebugUtilsMessengerEXT::null() {
            unsafe {
                self.functions
                    .destroy_debug_utils_messenger(messenger, None)
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_buf() {
        let mut buf = NameBuf::new();
        assert_eq!(c"vertex buffer", buf.c_str("vertex buffer"));
        let long = "n".repeat(200);
        assert_eq!(200, buf.c_str(&long).to_bytes().len());
        assert_eq!(c"cut", buf.c_str("cut\0off"));
        assert_eq!(c"", buf.c_str(""));
    }

    #[test]
    fn test_message_level() {
        use vk::DebugUtilsMessageSeverityFlagsEXT as S;
        assert_eq!(Level::ERROR, message_level(S::ERROR));
        assert_eq!(Level::WARN, message_level(S::WARNING));
        assert_eq!(Level::DEBUG, message_level(S::INFO));
        assert_eq!(Level::TRACE, message_level(S::VERBOSE));
    }
}
