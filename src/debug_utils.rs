//! Forwarding of `VK_EXT_debug_utils` messages to the `log` facade.

use std::{
    ffi::{c_void, CStr},
    fmt::{self, Write},
};

use ash::{ext, vk};

use crate::error::{check, Error, Result};

/// Writes `cstr` to `f`, replacing invalid UTF-8 sequences.
fn format_cstr<F>(f: &mut F, cstr: &CStr) -> fmt::Result
where
    F: fmt::Write,
{
    let mut bytes = cstr.to_bytes();

    loop {
        match std::str::from_utf8(bytes) {
            Ok(s) => return f.write_str(s),
            Err(e) => {
                let (valid, rest) = bytes.split_at(e.valid_up_to());
                f.write_str(std::str::from_utf8(valid).unwrap_or_default())?;
                f.write_char(char::REPLACEMENT_CHARACTER)?;

                match e.error_len() {
                    // Skip the unrecognized sequence.
                    Some(len) => bytes = &rest[len..],

                    // Unexpected end of input.
                    None => return Ok(()),
                }
            }
        }
    }
}

/// Builds a slice from a pointer/count pair in callback data.
///
/// # Safety
///
/// If `count` is nonzero, `ptr` must point to `count` valid values.
unsafe fn callback_slice<'a, T>(ptr: *const T, count: u32) -> &'a [T] {
    if ptr.is_null() || count == 0 {
        &[]
    } else {
        unsafe { std::slice::from_raw_parts(ptr, count as usize) }
    }
}

/// # Safety
///
/// Every non-null `p_label_name` must be a valid C string.
unsafe fn format_labels<F>(
    f: &mut F,
    about: &str,
    labels: &[vk::DebugUtilsLabelEXT<'_>],
) -> fmt::Result
where
    F: fmt::Write,
{
    if labels.is_empty() {
        return Ok(());
    }

    write!(f, "; {}: ", about)?;
    for (i, label) in labels.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        if !label.p_label_name.is_null() {
            format_cstr(f, unsafe { CStr::from_ptr(label.p_label_name) })?;
        }
    }

    Ok(())
}

/// # Safety
///
/// Every non-null `p_object_name` must be a valid C string.
unsafe fn format_objects<F>(
    f: &mut F,
    objects: &[vk::DebugUtilsObjectNameInfoEXT<'_>],
) -> fmt::Result
where
    F: fmt::Write,
{
    for object in objects {
        write!(
            f,
            "; object (type: {:?}, handle: 0x{:X}",
            object.object_type, object.object_handle
        )?;
        if !object.p_object_name.is_null() {
            f.write_str(", name: ")?;
            format_cstr(f, unsafe { CStr::from_ptr(object.p_object_name) })?;
        }
        f.write_str(")")?;
    }

    Ok(())
}

fn log_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> log::Level {
    match severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => log::Level::Error,
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::Level::Warn,
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => log::Level::Info,
        vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE => log::Level::Trace,
        _ => log::Level::Warn,
    }
}

const DEBUG_MESSAGE_INIT_CAPACITY: usize = 128;

/// # Safety
///
/// `data` must be the callback data passed by the driver.
unsafe fn format_message(
    ty: vk::DebugUtilsMessageTypeFlagsEXT,
    data: &vk::DebugUtilsMessengerCallbackDataEXT<'_>,
) -> std::result::Result<String, fmt::Error> {
    let mut msg = String::with_capacity(DEBUG_MESSAGE_INIT_CAPACITY);

    write!(msg, "{:?} ", ty)?;

    if data.p_message_id_name.is_null() {
        write!(msg, "[0x{:X}] ", data.message_id_number)?;
    } else {
        msg.write_char('[')?;
        format_cstr(&mut msg, unsafe { CStr::from_ptr(data.p_message_id_name) })?;
        write!(msg, " (0x{:X})] ", data.message_id_number)?;
    }

    if !data.p_message.is_null() {
        format_cstr(&mut msg, unsafe { CStr::from_ptr(data.p_message) })?;
    }

    unsafe {
        let queue_labels = callback_slice(data.p_queue_labels, data.queue_label_count);
        format_labels(&mut msg, "queue labels", queue_labels)?;

        let cmd_buf_labels = callback_slice(data.p_cmd_buf_labels, data.cmd_buf_label_count);
        format_labels(&mut msg, "command buffer labels", cmd_buf_labels)?;

        format_objects(&mut msg, callback_slice(data.p_objects, data.object_count))?;
    }

    Ok(msg)
}

unsafe extern "system" fn debug_utils_messenger_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    ty: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    // The application should always return VK_FALSE.

    if std::thread::panicking() {
        return vk::FALSE;
    }

    let Some(data) = (unsafe { callback_data.as_ref() }) else {
        return vk::FALSE;
    };

    match unsafe { format_message(ty, data) } {
        Ok(msg) => log::log!(log_level(severity), "{}", msg),
        Err(e) => log::error!("debug message formatting failed: {}", e),
    }

    vk::FALSE
}

/// Logs validation messages for as long as it lives.
pub struct DebugMessenger {
    loader: ext::debug_utils::Instance,
    raw: vk::DebugUtilsMessengerEXT,
}

impl Drop for DebugMessenger {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_debug_utils_messenger(self.raw, None);
        }
    }
}

impl DebugMessenger {
    pub fn new(entry: &ash::Entry, instance: &ash::Instance) -> Result<DebugMessenger> {
        let info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_utils_messenger_callback));

        let loader = ext::debug_utils::Instance::new(entry, instance);

        // Safety: the messenger is destroyed in the Drop impl, before the
        // instance.
        let raw = check(
            unsafe { loader.create_debug_utils_messenger(&info, None) },
            "vkCreateDebugUtilsMessengerEXT",
            Error::InstanceCreation,
        )?;
        log::debug!("created debug messenger");

        Ok(DebugMessenger { loader, raw })
    }
}
