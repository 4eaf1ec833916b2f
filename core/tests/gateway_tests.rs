/// Gateway operations against the simulated OS layer
/// Every OS interaction is observed through the recorded primitive calls

#[cfg(test)]
mod gateway_tests {
    use devgate_core::ioctl::*;
    use devgate_core::test_utils::{Primitive, SimDevice, SimulatedBackend};
    use devgate_core::{DeviceHandle, Gateway, GatewayError, OpenRequest, ResultCode, LIB_VERSION};
    use std::sync::Arc;

    const VOLUME: &str = "\\\\.\\X:";

    fn gateway_with(device: SimDevice) -> Gateway<SimulatedBackend> {
        let _ = env_logger::builder().is_test(true).try_init();
        Gateway::new(SimulatedBackend::new().with_device(VOLUME, device))
    }

    fn ops(gateway: &Gateway<SimulatedBackend>) -> Vec<Primitive> {
        gateway.backend().calls().iter().map(|c| c.op).collect()
    }

    #[test]
    fn test_short_read_scenario() {
        let gateway = gateway_with(SimDevice::with_data(vec![0x5A; 100]));

        let request = OpenRequest { read: true, write: false, random_access: false };
        let opened = gateway.open(VOLUME, request);
        assert_eq!(ResultCode::from(&opened), ResultCode::SUCCESS);
        let handle = opened.unwrap();

        let mut buf = [0u8; 512];
        let read = gateway.read(handle, &mut buf, 0, 512);
        assert_eq!(ResultCode::from(&read), ResultCode::SUCCESS);
        assert_eq!(read.unwrap(), 100, "short read must be reported, not retried");
        assert!(buf[..100].iter().all(|&b| b == 0x5A));
        assert_eq!(gateway.backend().count(Primitive::ReadFile), 1);

        assert_eq!(gateway.close(handle), Ok(()));
        let ops = ops(&gateway);
        assert_eq!(
            &ops[ops.len() - 2..],
            &[Primitive::DeviceIoControl(FSCTL_UNLOCK_VOLUME), Primitive::CloseHandle]
        );
        assert_eq!(gateway.backend().open_handles(), 0);
    }

    #[test]
    fn test_transfer_length_is_clamped_to_buffer() {
        let gateway = gateway_with(SimDevice::new(1 << 16));
        let handle = gateway.open(VOLUME, OpenRequest::read_write()).unwrap();
        let capacity = 64usize;
        let mut buf = vec![0u8; capacity];

        for (offset, len) in [(0, 64), (0, 1000), (10, 10), (10, 60), (63, 5), (32, i32::MAX)] {
            gateway.backend().clear_calls();
            let n = gateway.read(handle, &mut buf, offset, len).unwrap();
            let expected = (len as i64).min(capacity as i64 - offset as i64) as usize;
            assert_eq!(n, expected, "read offset {} len {}", offset, len);
            assert_eq!(gateway.backend().calls()[0].bytes, expected);

            gateway.backend().clear_calls();
            let n = gateway.write(handle, &buf, offset, len).unwrap();
            assert_eq!(n, expected, "write offset {} len {}", offset, len);
            assert_eq!(gateway.backend().calls()[0].bytes, expected);
        }
    }

    #[test]
    fn test_invalid_range_never_reaches_os() {
        let gateway = gateway_with(SimDevice::new(4096));
        let handle = gateway.open(VOLUME, OpenRequest::read_write()).unwrap();
        gateway.backend().clear_calls();

        let mut buf = [0u8; 32];
        for (offset, len) in [(-1, 8), (i32::MIN, 8), (32, 8), (40, 8), (0, 0), (0, -7), (31, 0)] {
            let read = gateway.read(handle, &mut buf, offset, len);
            assert!(matches!(read, Err(GatewayError::InvalidRange { .. })));
            assert_eq!(ResultCode::from(&read), ResultCode::SENTINEL);

            let write = gateway.write(handle, &buf, offset, len);
            assert_eq!(ResultCode::from(&write), ResultCode::SENTINEL);
        }
        assert!(gateway.backend().calls().is_empty(), "no OS primitive may run");
    }

    #[test]
    fn test_empty_buffer_is_rejected() {
        let gateway = gateway_with(SimDevice::new(512));
        let handle = gateway.open(VOLUME, OpenRequest::read_only()).unwrap();
        let mut empty: [u8; 0] = [];
        assert!(gateway.read(handle, &mut empty, 0, 10).is_err());
        assert_eq!(gateway.backend().count(Primitive::ReadFile), 0);
    }

    #[test]
    fn test_dismount_not_ready_is_success() {
        let gateway = gateway_with(SimDevice::new(512).with_ioctl_error(FSCTL_DISMOUNT_VOLUME, 21));
        let handle = gateway.open(VOLUME, OpenRequest::read_only()).unwrap();
        let result = gateway.dismount(handle);
        assert_eq!(ResultCode::from(&result), ResultCode::SUCCESS);
        assert_eq!(gateway.backend().count(Primitive::DeviceIoControl(FSCTL_DISMOUNT_VOLUME)), 1);
    }

    #[test]
    fn test_dismount_other_errors_pass_through() {
        let gateway = gateway_with(SimDevice::new(512).with_ioctl_error(FSCTL_DISMOUNT_VOLUME, 5));
        let handle = gateway.open(VOLUME, OpenRequest::read_only()).unwrap();
        let result = gateway.dismount(handle);
        assert_eq!(result, Err(GatewayError::Os(5)));
        assert_eq!(ResultCode::from(&result), ResultCode(5));
    }

    #[test]
    fn test_lock_reports_os_code() {
        let gateway = gateway_with(SimDevice::new(512).with_ioctl_error(FSCTL_LOCK_VOLUME, 32));
        let handle = gateway.open(VOLUME, OpenRequest::read_only()).unwrap();
        assert_eq!(gateway.lock(handle).unwrap_err().code(), ResultCode(32));
    }

    #[test]
    fn test_mbr_counts_only_used_entries() {
        let device = SimDevice::new(512).with_layout(PartitionStyle::Mbr, &[0x0C, 0x00, 0x00, 0x83]);
        let gateway = gateway_with(device);
        let handle = gateway.open(VOLUME, OpenRequest::query()).unwrap();
        let layout = gateway.partition_style(handle).unwrap();
        assert_eq!(layout.style, PartitionStyle::Mbr);
        assert_eq!(layout.partition_count, 2);
        assert_eq!(layout.to_slots(), [0, 2]);
    }

    #[test]
    fn test_gpt_reports_raw_entry_count() {
        let device = SimDevice::new(512).with_layout(PartitionStyle::Gpt, &[0, 0, 0]);
        let gateway = gateway_with(device);
        let handle = gateway.open(VOLUME, OpenRequest::query()).unwrap();
        assert_eq!(gateway.partition_style(handle).unwrap().to_slots(), [1, 3]);
    }

    #[test]
    fn test_close_ignores_failing_unlock() {
        let gateway = gateway_with(SimDevice::new(512).with_ioctl_error(FSCTL_UNLOCK_VOLUME, 158));
        let handle = gateway.open(VOLUME, OpenRequest::read_only()).unwrap();
        assert_eq!(gateway.close(handle), Ok(()));
        assert_eq!(gateway.backend().count(Primitive::DeviceIoControl(FSCTL_UNLOCK_VOLUME)), 1);
        assert_eq!(gateway.backend().count(Primitive::CloseHandle), 1);
    }

    #[test]
    fn test_close_failure_is_reported() {
        let gateway = gateway_with(SimDevice::new(512));
        let handle = gateway.open(VOLUME, OpenRequest::read_only()).unwrap();
        gateway.backend().fail(Primitive::CloseHandle, 6);
        assert_eq!(gateway.close(handle), Err(GatewayError::Os(6)));
        assert_eq!(gateway.backend().count(Primitive::DeviceIoControl(FSCTL_UNLOCK_VOLUME)), 1);
    }

    #[test]
    fn test_write_flush_seek_read_round_trip() {
        let gateway = gateway_with(SimDevice::new(8192));
        let handle = gateway.open(VOLUME, OpenRequest::read_write()).unwrap();

        let data: Vec<u8> = (0..1000u32).map(|i| (i * 7 % 251) as u8).collect();
        assert_eq!(gateway.write(handle, &data, 0, data.len() as i32), Ok(1000));
        gateway.flush(handle).unwrap();
        gateway.seek(handle, 0).unwrap();

        let mut back = vec![0u8; 1000];
        assert_eq!(gateway.read(handle, &mut back, 0, 1000), Ok(1000));
        assert_eq!(back, data);
        assert_eq!(gateway.close(handle), Ok(()));
    }

    #[test]
    fn test_read_lands_at_buffer_offset() {
        let gateway = gateway_with(SimDevice::with_data(vec![1, 2, 3, 4]));
        let handle = gateway.open(VOLUME, OpenRequest::read_only()).unwrap();
        let mut buf = [0xEEu8; 8];
        assert_eq!(gateway.read(handle, &mut buf, 6, 4), Ok(2));
        assert_eq!(buf, [0xEE, 0xEE, 0xEE, 0xEE, 0xEE, 0xEE, 1, 2]);
    }

    #[test]
    fn test_open_flags_and_access() {
        let gateway = gateway_with(SimDevice::new(512));
        let sim = gateway.backend();

        let h = gateway.open(VOLUME, OpenRequest { read: true, write: true, random_access: false }).unwrap();
        let (access, flags) = sim.open_flags(h).unwrap();
        assert_eq!(access.0, 0xC000_0000);
        assert!(flags.is_sequential());

        let h = gateway.open(VOLUME, OpenRequest::read_write()).unwrap();
        assert!(!sim.open_flags(h).unwrap().1.is_sequential());

        let h = gateway.open(VOLUME, OpenRequest::query()).unwrap();
        let (access, flags) = sim.open_flags(h).unwrap();
        assert_eq!(access.0, 0);
        assert!(!flags.is_sequential());
    }

    #[test]
    fn test_open_errors() {
        let gateway = gateway_with(SimDevice::new(512));
        assert_eq!(gateway.open("\\\\.\\Q:", OpenRequest::read_only()), Err(GatewayError::Os(2)));

        gateway.backend().fail(Primitive::CreateFile, 32);
        assert_eq!(
            gateway.open(VOLUME, OpenRequest::read_only()).unwrap_err().code(),
            ResultCode(32)
        );

        let calls_before = gateway.backend().calls().len();
        assert!(matches!(
            gateway.open("", OpenRequest::read_only()),
            Err(GatewayError::InvalidInput(_))
        ));
        assert_eq!(gateway.backend().calls().len(), calls_before);
    }

    #[test]
    fn test_unusable_handle_is_sentinel() {
        let backend = SimulatedBackend::new()
            .with_device(VOLUME, SimDevice::new(512))
            .with_unusable_handles();
        let gateway = Gateway::new(backend);
        let opened = gateway.open(VOLUME, OpenRequest::read_only());
        assert_eq!(opened, Err(GatewayError::InvalidHandle));
        assert_eq!(ResultCode::from(&opened), ResultCode::SENTINEL);
    }

    #[test]
    fn test_handle_survives_jlong_round_trip() {
        let gateway = gateway_with(SimDevice::with_data(vec![9; 16]));
        let handle = gateway.open(VOLUME, OpenRequest::read_only()).unwrap();
        let again = DeviceHandle::from_jlong(handle.to_jlong()).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(gateway.read(again, &mut buf, 0, 4), Ok(4));
    }

    #[test]
    fn test_geometry_queries() {
        let geometry = DiskGeometryEx {
            geometry: DiskGeometry {
                cylinders: 1946,
                media_type: 11,
                tracks_per_cylinder: 255,
                sectors_per_track: 63,
                bytes_per_sector: 512,
            },
            disk_size: 16_008_609_792,
        };
        let gateway = gateway_with(SimDevice::new(512).with_geometry(geometry));
        let handle = gateway.open(VOLUME, OpenRequest::query()).unwrap();

        assert_eq!(gateway.disk_geometry(handle).unwrap().to_slots(), [1946, 255, 63, 512]);
        assert_eq!(
            gateway.disk_geometry_ex(handle).unwrap().to_slots(),
            [1946, 255, 63, 512, 16_008_609_792]
        );
    }

    #[test]
    fn test_missing_reply_reports_os_code() {
        let gateway = gateway_with(SimDevice::new(512));
        let handle = gateway.open(VOLUME, OpenRequest::query()).unwrap();
        assert_eq!(gateway.disk_geometry(handle), Err(GatewayError::Os(1)));
        assert_eq!(gateway.hotplug_info(handle).unwrap_err().code(), ResultCode(1));
    }

    #[test]
    fn test_partition_and_hotplug_info() {
        let device = SimDevice::new(512)
            .with_partition(PartitionInfo { number: 2, length: 1 << 30 })
            .with_hotplug(HotplugInfo { media_removable: true, media_hotplug: false, device_hotplug: true });
        let gateway = gateway_with(device);
        let handle = gateway.open(VOLUME, OpenRequest::query()).unwrap();
        assert_eq!(gateway.partition_info(handle).unwrap().to_slots(), [2, 1 << 30]);
        assert_eq!(gateway.hotplug_info(handle).unwrap().to_slots(), [true, false, true]);
    }

    #[test]
    fn test_physical_drive_num() {
        let gateway = gateway_with(SimDevice::new(512).with_disk_number(3));
        let handle = gateway.open(VOLUME, OpenRequest::query()).unwrap();
        assert_eq!(gateway.physical_drive_num(handle), Ok(3));

        let gateway = gateway_with(SimDevice::new(512));
        let handle = gateway.open(VOLUME, OpenRequest::query()).unwrap();
        let err = gateway.physical_drive_num(handle).unwrap_err();
        assert_eq!(err.code(), ResultCode::SENTINEL);
    }

    #[test]
    fn test_storage_device_info() {
        let info = StorageDeviceInfo {
            bus_type: BUS_TYPE_USB,
            is_usb: true,
            vendor_id: b"Generic ".to_vec(),
            product_id: b"Flash Disk      ".to_vec(),
        };
        let gateway = gateway_with(SimDevice::new(512).with_storage(&info));
        let handle = gateway.open(VOLUME, OpenRequest::query()).unwrap();

        let decoded = gateway.storage_device_info(handle).unwrap();
        assert!(decoded.is_usb);
        assert_eq!(decoded.vendor_text(), "Generic");
        assert_eq!(decoded.product_text(), "Flash Disk");

        let again = gateway.storage_device_info(handle).unwrap();
        assert_eq!(again, decoded);
    }

    #[test]
    fn test_delete_drive_layout() {
        let device = SimDevice::new(512).with_layout(PartitionStyle::Mbr, &[0x0C]);
        let gateway = gateway_with(device);
        let handle = gateway.open(VOLUME, OpenRequest::read_write()).unwrap();
        gateway.delete_drive_layout(handle).unwrap();
        assert_eq!(gateway.partition_style(handle).unwrap().style, PartitionStyle::Raw);
    }

    #[test]
    fn test_volume_and_path_utilities() {
        let backend = SimulatedBackend::new()
            .with_volume('C', 3, Some("SYSTEM"), None)
            .with_volume('E', 2, None, None)
            .with_net_drive('Z', "\\\\nas\\media")
            .with_short_path("C:\\Program Files\\devgate", "C:\\PROGRA~1\\devgate");
        let gateway = Gateway::new(backend);

        assert_eq!(gateway.logical_drives(), (1 << 2) | (1 << 4) | (1 << 25));
        assert_eq!(gateway.drive_type("C:\\"), 3);
        assert_eq!(gateway.drive_type("Q:\\"), 1);
        assert_eq!(gateway.volume_label("C:\\").unwrap(), "SYSTEM");
        assert_eq!(gateway.volume_label("E:\\").unwrap(), "");
        assert_eq!(gateway.volume_label("Q:\\"), Err(GatewayError::Os(3)));
        assert_eq!(gateway.net_connection("Z:").unwrap(), "\\\\nas\\media");
        assert_eq!(gateway.net_connection("C:"), Err(GatewayError::Os(2250)));

        let long: Vec<u16> = "C:\\Program Files\\devgate".encode_utf16().collect();
        let short = gateway.short_path_name(&long).unwrap();
        assert_eq!(String::from_utf16_lossy(&short), "C:\\PROGRA~1\\devgate");

        let unknown: Vec<u16> = "C:\\nowhere".encode_utf16().collect();
        assert_eq!(gateway.short_path_name(&unknown).unwrap_err().code(), ResultCode::SENTINEL);
        assert!(gateway.short_path_name(&[]).is_err());
    }

    #[test]
    fn test_error_message_is_trimmed() {
        let gateway = Gateway::new(SimulatedBackend::new().with_message(1167, "   \r\n"));
        assert_eq!(gateway.error_message(5).as_deref(), Some("Access is denied."));
        assert_eq!(gateway.error_message(1167), None);
        assert_eq!(gateway.error_message(0xDEAD), None);
    }

    #[test]
    fn test_lib_version() {
        let gateway = Gateway::new(SimulatedBackend::new());
        assert_eq!(gateway.lib_version(), LIB_VERSION);
        assert_eq!(LIB_VERSION, 2);
    }

    #[test]
    fn test_independent_handles_across_threads() {
        let backend = SimulatedBackend::new()
            .with_device("\\\\.\\E:", SimDevice::with_data(vec![0xE; 4096]))
            .with_device("\\\\.\\F:", SimDevice::with_data(vec![0xF; 4096]));
        let gateway = Gateway::new(Arc::new(backend));

        std::thread::scope(|scope| {
            for (path, fill) in [("\\\\.\\E:", 0xEu8), ("\\\\.\\F:", 0xFu8)] {
                let gateway = &gateway;
                scope.spawn(move || {
                    let handle = gateway.open(path, OpenRequest::read_only()).unwrap();
                    let mut buf = [0u8; 512];
                    for _ in 0..8 {
                        assert_eq!(gateway.read(handle, &mut buf, 0, 512), Ok(512));
                        assert!(buf.iter().all(|&b| b == fill));
                    }
                    gateway.close(handle).unwrap();
                });
            }
        });
        assert_eq!(gateway.backend().open_handles(), 0);
    }
}
