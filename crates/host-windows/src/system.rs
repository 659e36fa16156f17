use std::mem::size_of;

use diskweave_core::wide::string_from_wide_array;
use diskweave_core::HostInfo;

use windows_sys::Win32::System::SystemInformation::{
    ComputerNameNetBIOS, GetComputerNameExW, GetVersionExW, OSVERSIONINFOW,
};

pub fn host_info() -> HostInfo {
    HostInfo {
        os: "windows".to_string(),
        os_version: os_version_string(),
        machine: machine_name_string(),
    }
}

fn os_version_string() -> String {
    let mut info: OSVERSIONINFOW = unsafe { std::mem::zeroed() };
    info.dwOSVersionInfoSize = size_of::<OSVERSIONINFOW>() as u32;
    if unsafe { GetVersionExW(&mut info) } != 0 {
        return format!(
            "{}.{}.{}",
            info.dwMajorVersion, info.dwMinorVersion, info.dwBuildNumber
        );
    }
    "unknown".to_string()
}

fn machine_name_string() -> String {
    let mut buf = [0u16; 256];
    let mut size = buf.len() as u32;
    if unsafe { GetComputerNameExW(ComputerNameNetBIOS, buf.as_mut_ptr(), &mut size) } != 0 {
        return string_from_wide_array(&buf[..size as usize]);
    }
    "unknown".to_string()
}
