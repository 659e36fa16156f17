//! SetupAPI / CfgMgr32 device namespace.

use std::mem::size_of;
use std::ptr;

use diskweave_core::buffer::InvokeFailure;
use diskweave_core::device::{DeviceNamespace, DeviceProperty};
use diskweave_core::error::code;
use diskweave_core::wide::wide;
use tracing::debug;
use uuid::Uuid;

use windows_sys::core::GUID;
use windows_sys::Win32::Devices::DeviceAndDriverInstallation::{
    CM_Connect_MachineW, CM_Disconnect_Machine, CM_MapCrToWin32Err, SetupDiDestroyDeviceInfoList,
    SetupDiEnumDeviceInterfaces, SetupDiGetClassDevsExW, SetupDiGetDeviceInstanceIdW,
    SetupDiGetDeviceInterfaceDetailW, SetupDiGetDevicePropertyW,
    SetupDiGetDeviceRegistryPropertyW, CR_SUCCESS, DIGCF_DEVICEINTERFACE, DIGCF_PRESENT, HDEVINFO,
    SP_DEVICE_INTERFACE_DATA, SP_DEVICE_INTERFACE_DETAIL_DATA_W, SP_DEVINFO_DATA,
};
use windows_sys::Win32::Devices::Properties::DEVPKEY_Device_BusReportedDeviceDesc;
use windows_sys::Win32::Foundation::{GetLastError, ERROR_GEN_FAILURE, INVALID_HANDLE_VALUE};

/// `cbSize` of the detail header; the path follows it.
const DETAIL_PATH_OFFSET: usize = size_of::<u32>();

/// The local (or remote) Plug and Play device namespace.
#[derive(Debug, Default, Clone, Copy)]
pub struct SetupApi;

/// Remote CfgMgr32 connection; `None` for the local machine.
pub struct Session(Option<isize>);

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(machine) = self.0.take() {
            unsafe {
                CM_Disconnect_Machine(machine);
            }
        }
    }
}

pub struct ClassList(HDEVINFO);

impl Drop for ClassList {
    fn drop(&mut self) {
        unsafe {
            SetupDiDestroyDeviceInfoList(self.0);
        }
    }
}

pub struct Interface {
    data: SP_DEVICE_INTERFACE_DATA,
    device: SP_DEVINFO_DATA,
}

/// Detail buffer offered for a path capacity of `capacity` bytes; never
/// smaller than the fixed header the API validates against `cbSize`.
fn detail_len(capacity: usize) -> usize {
    (DETAIL_PATH_OFFSET + capacity).max(size_of::<SP_DEVICE_INTERFACE_DETAIL_DATA_W>())
}

/// Path capacity implied by the detail size the API asked for.
fn path_capacity(required: u32) -> Option<usize> {
    (required as usize).checked_sub(DETAIL_PATH_OFFSET)
}

/// Copies the NUL-terminated path out of a filled detail buffer.
fn copy_path(raw: &[u8], buffer: &mut [u8]) -> Result<usize, InvokeFailure> {
    let path = &raw[DETAIL_PATH_OFFSET.min(raw.len())..];
    let len = path
        .chunks_exact(2)
        .position(|unit| unit[0] == 0 && unit[1] == 0)
        .map_or(path.len() & !1, |units| units * 2 + 2);
    if len > buffer.len() {
        return Err(InvokeFailure::with_required(
            code::ERROR_INSUFFICIENT_BUFFER,
            len,
        ));
    }
    buffer[..len].copy_from_slice(&path[..len]);
    Ok(len)
}

fn machine_name(host: &str) -> Vec<u16> {
    wide(&format!(r"\\{}", host.trim_start_matches('\\')))
}

fn to_guid(uuid: &Uuid) -> GUID {
    GUID::from_u128(uuid.as_u128())
}

fn last_error() -> u32 {
    unsafe { GetLastError() }
}

impl DeviceNamespace for SetupApi {
    type Session = Session;
    type ClassList = ClassList;
    type Interface = Interface;

    fn connect(&self, host: Option<&str>) -> Result<Session, u32> {
        let Some(host) = host else {
            return Ok(Session(None));
        };
        let name = machine_name(host);
        let mut machine: isize = 0;
        let cr = unsafe { CM_Connect_MachineW(name.as_ptr(), &mut machine) };
        if cr != CR_SUCCESS {
            return Err(unsafe { CM_MapCrToWin32Err(cr, ERROR_GEN_FAILURE) });
        }
        debug!(host, "connected to remote device namespace");
        Ok(Session(Some(machine)))
    }

    fn open_class(
        &self,
        _session: &Session,
        class: &Uuid,
        host: Option<&str>,
    ) -> Result<ClassList, u32> {
        let guid = to_guid(class);
        let machine = host.map(machine_name);
        let list = unsafe {
            SetupDiGetClassDevsExW(
                &guid,
                ptr::null(),
                0,
                DIGCF_PRESENT | DIGCF_DEVICEINTERFACE,
                0,
                machine.as_ref().map_or(ptr::null(), |name| name.as_ptr()),
                ptr::null(),
            )
        };
        if list == INVALID_HANDLE_VALUE {
            return Err(last_error());
        }
        Ok(ClassList(list))
    }

    fn interface(&self, list: &ClassList, class: &Uuid, index: u32) -> Result<Interface, u32> {
        let guid = to_guid(class);
        let mut data = SP_DEVICE_INTERFACE_DATA {
            cbSize: size_of::<SP_DEVICE_INTERFACE_DATA>() as u32,
            InterfaceClassGuid: GUID::from_u128(0),
            Flags: 0,
            Reserved: 0,
        };
        let ok = unsafe { SetupDiEnumDeviceInterfaces(list.0, ptr::null(), &guid, index, &mut data) };
        if ok == 0 {
            return Err(last_error());
        }
        Ok(Interface {
            data,
            device: SP_DEVINFO_DATA {
                cbSize: size_of::<SP_DEVINFO_DATA>() as u32,
                ClassGuid: GUID::from_u128(0),
                DevInst: 0,
                Reserved: 0,
            },
        })
    }

    fn interface_detail(
        &self,
        list: &ClassList,
        interface: &mut Interface,
        buffer: &mut [u8],
    ) -> Result<usize, InvokeFailure> {
        let mut raw = vec![0u8; detail_len(buffer.len())];
        let header = size_of::<SP_DEVICE_INTERFACE_DETAIL_DATA_W>() as u32;
        raw[..DETAIL_PATH_OFFSET].copy_from_slice(&header.to_le_bytes());
        let mut required = 0u32;
        let ok = unsafe {
            SetupDiGetDeviceInterfaceDetailW(
                list.0,
                &interface.data,
                raw.as_mut_ptr() as *mut SP_DEVICE_INTERFACE_DETAIL_DATA_W,
                raw.len() as u32,
                &mut required,
                &mut interface.device,
            )
        };
        if ok == 0 {
            return Err(InvokeFailure {
                code: last_error(),
                required: path_capacity(required),
            });
        }
        copy_path(&raw, buffer)
    }

    fn instance_id(
        &self,
        list: &ClassList,
        interface: &Interface,
        buffer: &mut [u8],
    ) -> Result<usize, InvokeFailure> {
        let mut units = vec![0u16; buffer.len() / 2];
        let mut required = 0u32;
        let ok = unsafe {
            SetupDiGetDeviceInstanceIdW(
                list.0,
                &interface.device,
                units.as_mut_ptr(),
                units.len() as u32,
                &mut required,
            )
        };
        if ok == 0 {
            return Err(InvokeFailure::with_required(
                last_error(),
                required as usize * 2,
            ));
        }
        for (chunk, unit) in buffer.chunks_exact_mut(2).zip(&units) {
            chunk.copy_from_slice(&unit.to_le_bytes());
        }
        Ok(units.len() * 2)
    }

    fn property(
        &self,
        list: &ClassList,
        interface: &Interface,
        property: DeviceProperty,
        buffer: &mut [u8],
    ) -> Result<usize, InvokeFailure> {
        let mut required = 0u32;
        let mut value_type = 0u32;
        let ok = unsafe {
            match property.registry_code() {
                Some(spdrp) => SetupDiGetDeviceRegistryPropertyW(
                    list.0,
                    &interface.device,
                    spdrp,
                    &mut value_type,
                    buffer.as_mut_ptr(),
                    buffer.len() as u32,
                    &mut required,
                ),
                None => SetupDiGetDevicePropertyW(
                    list.0,
                    &interface.device,
                    &DEVPKEY_Device_BusReportedDeviceDesc,
                    &mut value_type,
                    buffer.as_mut_ptr(),
                    buffer.len() as u32,
                    &mut required,
                    0,
                ),
            }
        };
        if ok == 0 {
            return Err(InvokeFailure::with_required(last_error(), required as usize));
        }
        Ok((required as usize).min(buffer.len()))
    }
}
