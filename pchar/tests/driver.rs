use pchar::{
    ControlReply, ControlRequest, DeviceConfig, DeviceError, Driver, Fd, FifoInfo, IoctlArg,
    FIFO_CLEAR, FIFO_GET_INFO, FIFO_INFO_SIZE, FIFO_RESIZE,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

fn wait_for(cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(1));
    }
}

fn driver() -> Driver {
    Driver::new(&DeviceConfig::default()).unwrap()
}

fn raw_info(driver: &Driver, fd: Fd) -> FifoInfo {
    let mut out = [0u8; FIFO_INFO_SIZE];
    assert_eq!(
        driver
            .ioctl(fd, FIFO_GET_INFO, IoctlArg::Out(&mut out))
            .unwrap(),
        0
    );
    FifoInfo::from_user(&out).unwrap()
}

fn info(size: usize, length: usize, avail: usize) -> FifoInfo {
    FifoInfo {
        size,
        length,
        avail,
    }
}

// --------------------------------------------------------------------
// Control scenario through the raw interface
//

#[test]
fn test_raw_control_scenario() {
    let driver = driver();
    let fd = driver.open_path("/dev/pchar0").unwrap();

    assert_eq!(
        driver.write(fd, b"abcdefghijklmnopqrstuvwxyz").unwrap(),
        26
    );
    assert_eq!(raw_info(&driver, fd), info(32, 26, 6));

    assert_eq!(driver.write(fd, b"DESD").unwrap(), 4);
    assert_eq!(raw_info(&driver, fd), info(32, 30, 2));

    // avail < 4: only part of the next write fits
    assert_eq!(driver.write(fd, b"DESD").unwrap(), 2);

    assert_eq!(driver.ioctl(fd, FIFO_CLEAR, IoctlArg::None).unwrap(), 0);
    assert_eq!(raw_info(&driver, fd), info(32, 0, 32));

    assert_eq!(driver.ioctl(fd, FIFO_RESIZE, IoctlArg::Value(64)).unwrap(), 0);
    assert_eq!(raw_info(&driver, fd), info(64, 0, 64));
}

#[test]
fn test_typed_control_scenario() {
    let driver = driver();
    let fd = driver.open(1).unwrap();
    let get_info = |driver: &Driver| match driver.control(fd, ControlRequest::GetInfo).unwrap() {
        ControlReply::Info(info) => info,
        ControlReply::Done => panic!("get-info returned no info"),
    };

    driver.write(fd, b"abcdefghijklmnopqrstuvwxyz").unwrap();
    assert_eq!(get_info(&driver), info(32, 26, 6));
    driver.control(fd, ControlRequest::Clear).unwrap();
    assert_eq!(get_info(&driver), info(32, 0, 32));
    driver.control(fd, ControlRequest::Resize(64)).unwrap();
    assert_eq!(get_info(&driver), info(64, 0, 64));
}

#[test]
fn test_raw_info_layout() {
    let driver = driver();
    let fd = driver.open(0).unwrap();
    driver.write(fd, b"abc").unwrap();

    let mut out = [0xffu8; 8];
    driver
        .ioctl(fd, FIFO_GET_INFO, IoctlArg::Out(&mut out))
        .unwrap();
    let mut expected = Vec::new();
    for field in [32i16, 3, 29] {
        expected.extend_from_slice(&field.to_ne_bytes());
    }
    assert_eq!(&out[..FIFO_INFO_SIZE], &expected[..]);
    // bytes past the structure are untouched
    assert_eq!(&out[FIFO_INFO_SIZE..], &[0xff, 0xff]);
}

// --------------------------------------------------------------------
// Raw interface errors
//

#[test]
fn test_get_info_without_room_is_transfer_error() {
    let driver = driver();
    let fd = driver.open(0).unwrap();

    let mut short = [0u8; FIFO_INFO_SIZE - 1];
    let err = driver
        .ioctl(fd, FIFO_GET_INFO, IoctlArg::Out(&mut short))
        .unwrap_err();
    assert!(matches!(err, DeviceError::Transfer(_)));
    assert_eq!(err.errno(), -14);
    assert_eq!(short, [0u8; FIFO_INFO_SIZE - 1]);

    assert!(matches!(
        driver.ioctl(fd, FIFO_GET_INFO, IoctlArg::None),
        Err(DeviceError::Transfer(_))
    ));
}

#[test]
fn test_unknown_command_is_invalid() {
    let driver = driver();
    let fd = driver.open(0).unwrap();
    let err = driver.ioctl(fd, 0x7899, IoctlArg::None).unwrap_err();
    assert!(matches!(err, DeviceError::InvalidArgument(_)));
    assert_eq!(err.errno(), -22);
}

#[test]
fn test_bad_resize_values_are_invalid() {
    let driver = driver();
    let fd = driver.open(0).unwrap();
    for arg in [IoctlArg::Value(0), IoctlArg::Value(-5), IoctlArg::None] {
        assert!(matches!(
            driver.ioctl(fd, FIFO_RESIZE, arg),
            Err(DeviceError::InvalidArgument(_))
        ));
    }
    assert_eq!(raw_info(&driver, fd).size, 32);
}

#[test]
fn test_resize_above_limit_keeps_fifo() {
    let config = DeviceConfig {
        max_fifo_size: 128,
        ..DeviceConfig::default()
    };
    let driver = Driver::new(&config).unwrap();
    let fd = driver.open(0).unwrap();
    driver.write(fd, b"payload").unwrap();
    let before = raw_info(&driver, fd);

    let err = driver
        .ioctl(fd, FIFO_RESIZE, IoctlArg::Value(129))
        .unwrap_err();
    assert_eq!(err, DeviceError::Allocation { requested: 129 });
    assert_eq!(err.errno(), -12);
    assert_eq!(raw_info(&driver, fd), before);

    let mut buf = [0u8; 16];
    let n = driver.read(fd, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"payload");
}

// --------------------------------------------------------------------
// Handles
//

#[test]
fn test_open_unknown_device() {
    let driver = driver();
    assert!(matches!(driver.open(4), Err(DeviceError::NotFound(_))));
    assert!(matches!(
        driver.open_path("/dev/pchar9"),
        Err(DeviceError::NotFound(_))
    ));
}

#[test]
fn test_close_then_use_is_bad_handle() {
    let driver = driver();
    let fd = driver.open(0).unwrap();
    assert_eq!(driver.open_count(), 1);
    driver.close(fd).unwrap();
    assert_eq!(driver.open_count(), 0);

    assert_eq!(driver.close(fd), Err(DeviceError::BadHandle(fd.id())));
    let mut buf = [0u8; 1];
    assert_eq!(
        driver.read(fd, &mut buf),
        Err(DeviceError::BadHandle(fd.id()))
    );
    assert_eq!(DeviceError::BadHandle(fd.id()).errno(), -9);
}

#[test]
fn test_data_outlives_handles() {
    let driver = driver();
    let writer = driver.open(2).unwrap();
    driver.write(writer, b"persist").unwrap();
    driver.close(writer).unwrap();

    let reader = driver.open_path("pchar2").unwrap();
    assert_ne!(reader, writer);
    let mut buf = [0u8; 16];
    let n = driver.read(reader, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"persist");
}

#[test]
fn test_handles_on_same_device_share_fifo() {
    let driver = driver();
    let a = driver.open(0).unwrap();
    let b = driver.open(0).unwrap();
    let other = driver.open(1).unwrap();

    driver.write(a, b"shared").unwrap();
    let mut buf = [0u8; 16];
    assert_eq!(driver.read(other, &mut buf).unwrap(), 0);
    let n = driver.read(b, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"shared");
}

// --------------------------------------------------------------------
// Interruption through the driver
//

#[test]
fn test_interrupt_blocked_writer_by_fd() {
    init_tracing();
    let driver = Arc::new(driver());
    let fd = driver.open(3).unwrap();
    driver.write(fd, &[b'z'; 32]).unwrap();

    let driver_clone = Arc::clone(&driver);
    let writer = thread::spawn(move || driver_clone.write(fd, b"late"));

    let device = Arc::clone(driver.file(fd).unwrap().device());
    wait_for(|| device.waiting_writers() == 1);
    driver.interrupt(fd).unwrap();

    assert_eq!(writer.join().unwrap(), Err(DeviceError::Interrupted));
    assert_eq!(raw_info(&driver, fd), info(32, 32, 0));
}

#[test]
fn test_close_during_blocked_write() {
    init_tracing();
    let driver = Arc::new(driver());
    let fd = driver.open(0).unwrap();
    let file = driver.file(fd).unwrap();
    file.write(&[b'a'; 32]).unwrap();

    let blocked = file.clone();
    let writer = thread::spawn(move || blocked.write(b"b"));
    wait_for(|| file.device().waiting_writers() == 1);

    driver.close(fd).unwrap();
    let reader = driver.open(0).unwrap();
    let mut buf = [0u8; 1];
    driver.read(reader, &mut buf).unwrap();

    assert_eq!(writer.join().unwrap(), Ok(1));
}

// --------------------------------------------------------------------
// embedded-io adapters
//

#[test]
fn test_open_file_as_embedded_io() {
    use embedded_io::{Read, Write};

    let driver = driver();
    let fd = driver.open(0).unwrap();
    let mut file = driver.file(fd).unwrap();

    file.write_all(b"via embedded-io").unwrap();
    file.flush().unwrap();

    let mut buf = [0u8; 15];
    file.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"via embedded-io");
}

#[test]
fn test_single_instance_config() {
    let driver = Driver::new(&DeviceConfig::single_instance()).unwrap();
    assert_eq!(driver.table().len(), 1);
    let fd = driver.open(0).unwrap();
    driver.write(fd, &[0u8; 40]).unwrap();
    assert_eq!(driver.write(fd, b"x"), Err(DeviceError::NoSpace));
    driver.shutdown();
}

#[test]
fn test_interrupt_cancels_every_writer_on_fd() {
    init_tracing();
    let config = DeviceConfig {
        fifo_size: 2,
        ..DeviceConfig::default()
    };
    let driver = Arc::new(Driver::new(&config).unwrap());
    let fd = driver.open(0).unwrap();
    driver.write(fd, b"ab").unwrap();

    let writers: Vec<_> = (0..2)
        .map(|_| {
            let driver = Arc::clone(&driver);
            thread::spawn(move || driver.write(fd, b"c"))
        })
        .collect();
    let file = driver.file(fd).unwrap();
    wait_for(|| file.device().waiting_writers() == 2);

    driver.interrupt(fd).unwrap();
    for writer in writers {
        assert_eq!(writer.join().unwrap(), Err(DeviceError::Interrupted));
    }
    assert_eq!(file.device().waiting_writers(), 0);
    assert_eq!(file.interrupt().armed(), 0);
    assert_eq!(raw_info(&driver, fd), info(2, 2, 0));
}

#[test]
fn test_earlier_writer_stays_cancellable_after_later_one_finishes() {
    init_tracing();
    let config = DeviceConfig {
        fifo_size: 2,
        ..DeviceConfig::default()
    };
    let driver = Arc::new(Driver::new(&config).unwrap());
    let fd = driver.open(0).unwrap();
    let file = driver.file(fd).unwrap();
    driver.write(fd, b"ab").unwrap();

    let early = {
        let driver = Arc::clone(&driver);
        thread::spawn(move || driver.write(fd, b"long"))
    };
    wait_for(|| file.device().waiting_writers() == 1);
    let late = {
        let driver = Arc::clone(&driver);
        thread::spawn(move || driver.write(fd, b"x"))
    };
    wait_for(|| file.device().waiting_writers() == 2);

    // one byte of room: whichever writer locks first takes it, the other
    // parks again (or, if both passed the space check, gets 0 bytes)
    let reader = driver.open(0).unwrap();
    let mut buf = [0u8; 1];
    driver.read(reader, &mut buf).unwrap();
    wait_for(|| {
        let finished = usize::from(early.is_finished()) + usize::from(late.is_finished());
        finished == 2
            || (finished == 1
                && file.device().waiting_writers() == 1
                && file.interrupt().armed() == 1)
    });

    driver.interrupt(fd).unwrap();
    let results = [early.join().unwrap(), late.join().unwrap()];
    assert!(results.contains(&Ok(1)));
    assert!(results
        .iter()
        .all(|r| matches!(r, Ok(0 | 1) | Err(DeviceError::Interrupted))));
    assert_eq!(file.device().waiting_writers(), 0);
    assert_eq!(file.interrupt().armed(), 0);
}
