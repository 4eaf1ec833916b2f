/// The older calling convention must behave exactly like the current one

#[cfg(test)]
mod legacy_tests {
    use devgate_core::ioctl::FSCTL_UNLOCK_VOLUME;
    use devgate_core::joystick::{JoystickBounds, JoystickPos};
    use devgate_core::test_utils::{Primitive, SimDevice, SimulatedBackend};
    use devgate_core::{AccessMode, Gateway, GatewayError, LegacyGateway};

    const VOLUME: &str = "\\\\.\\A:";

    fn gateway() -> Gateway<SimulatedBackend> {
        let backend = SimulatedBackend::new()
            .with_device(VOLUME, SimDevice::new(4096))
            .with_joystick(
                0,
                JoystickBounds { x_min: 0, x_max: 65535, y_min: 0, y_max: 65535 },
                JoystickPos { buttons: 1, x: 32767, y: 0 },
            );
        Gateway::new(backend)
    }

    #[test]
    fn test_read_only_open_requests_read_access() {
        let gateway = gateway();
        let legacy = LegacyGateway::new(&gateway);
        let handle = legacy.open(VOLUME, true, false).unwrap();
        let (access, flags) = gateway.backend().open_flags(handle).unwrap();
        assert_eq!(access, AccessMode::READ);
        assert!(flags.is_sequential());
    }

    #[test]
    fn test_writable_open_requests_both() {
        let gateway = gateway();
        let legacy = LegacyGateway::new(&gateway);
        let handle = legacy.open(VOLUME, false, true).unwrap();
        let (access, flags) = gateway.backend().open_flags(handle).unwrap();
        assert_eq!(access, AccessMode::READ | AccessMode::WRITE);
        assert!(!flags.is_sequential());
    }

    #[test]
    fn test_transfers_delegate() {
        let gateway = gateway();
        let legacy = LegacyGateway::new(&gateway);
        let handle = legacy.open(VOLUME, false, true).unwrap();

        let sector: Vec<u8> = (0..=255u8).cycle().take(512).collect();
        assert_eq!(legacy.write(handle, &sector, 0, 512), Ok(512));
        legacy.flush(handle).unwrap();
        legacy.seek(handle, 0).unwrap();
        let mut back = vec![0u8; 600];
        assert_eq!(legacy.read(handle, &mut back, 88, 600), Ok(512));
        assert_eq!(&back[88..], &sector[..]);

        assert!(matches!(
            legacy.read(handle, &mut back, -4, 16),
            Err(GatewayError::InvalidRange { .. })
        ));

        legacy.close(handle).unwrap();
        assert_eq!(gateway.backend().count(Primitive::DeviceIoControl(FSCTL_UNLOCK_VOLUME)), 1);
    }

    #[test]
    fn test_joystick_and_messages_delegate() {
        let gateway = gateway();
        let legacy = LegacyGateway::new(&gateway);
        assert_eq!(legacy.joystick_bounds(0).unwrap().to_slots(), [0, 65535, 0, 65535]);
        assert_eq!(legacy.joystick_pos(0).unwrap().to_slots(), [1, 32767, 0]);
        assert!(legacy.joystick_pos(3).is_err());
        assert_eq!(legacy.error_message(21).as_deref(), Some("The device is not ready."));
    }
}
