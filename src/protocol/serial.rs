//! Serial device link
//!
//! The device node is opened as a plain file and switched to raw mode with
//! termios. Reads return after at most 100 ms (VMIN=0, VTIME=1) so the
//! framing reader can notice shutdown.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};

use super::link::ByteLink;
use crate::error::TransportError;

pub struct SerialLink {
    port: String,
    file: File,
}

impl SerialLink {
    pub fn open(port: &str, baud_rate: u32) -> Result<Self, TransportError> {
        let open_err = |source: io::Error| TransportError::Open {
            endpoint: port.to_string(),
            source,
        };

        let mut options = OpenOptions::new();
        options.read(true).write(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.custom_flags(libc::O_NOCTTY);
        }
        let file = options.open(port).map_err(open_err)?;

        #[cfg(unix)]
        configure_raw(&file, baud_rate).map_err(open_err)?;
        #[cfg(not(unix))]
        log::warn!(
            "Serial line settings are not applied on this platform; assuming {} baud is preconfigured",
            baud_rate
        );

        log::info!("Opened serial port {} at {} baud", port, baud_rate);
        Ok(Self {
            port: port.to_string(),
            file,
        })
    }
}

#[cfg(unix)]
fn configure_raw(file: &File, baud_rate: u32) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let fd = file.as_raw_fd();
    let speed = baud_constant(baud_rate).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unsupported baud rate {}", baud_rate),
        )
    })?;

    // SAFETY: fd is a valid open descriptor owned by `file` for the duration
    // of these calls, and `tio` is fully initialized by tcgetattr before use.
    unsafe {
        let mut tio: libc::termios = std::mem::zeroed();
        if libc::tcgetattr(fd, &mut tio) != 0 {
            return Err(io::Error::last_os_error());
        }
        libc::cfmakeraw(&mut tio);
        tio.c_cflag |= libc::CLOCAL | libc::CREAD;
        tio.c_cc[libc::VMIN] = 0;
        tio.c_cc[libc::VTIME] = 1;
        if libc::cfsetispeed(&mut tio, speed) != 0 || libc::cfsetospeed(&mut tio, speed) != 0 {
            return Err(io::Error::last_os_error());
        }
        if libc::tcsetattr(fd, libc::TCSANOW, &tio) != 0 {
            return Err(io::Error::last_os_error());
        }
        libc::tcflush(fd, libc::TCIOFLUSH);
    }
    Ok(())
}

#[cfg(target_os = "linux")]
fn baud_constant(baud_rate: u32) -> Option<libc::speed_t> {
    let speed = match baud_rate {
        9600 => libc::B9600,
        19200 => libc::B19200,
        38400 => libc::B38400,
        57600 => libc::B57600,
        115200 => libc::B115200,
        230400 => libc::B230400,
        460800 => libc::B460800,
        921600 => libc::B921600,
        _ => return None,
    };
    Some(speed)
}

// BSD-derived systems take the numeric rate directly
#[cfg(all(unix, not(target_os = "linux")))]
fn baud_constant(baud_rate: u32) -> Option<libc::speed_t> {
    Some(baud_rate as libc::speed_t)
}

impl ByteLink for SerialLink {
    fn write_all(&self, bytes: &[u8]) -> io::Result<()> {
        let mut file = &self.file;
        file.write_all(bytes)?;
        file.flush()
    }

    fn read_chunk(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut file = &self.file;
        file.read(buf)
    }

    fn discard_input(&self) -> io::Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            // SAFETY: the descriptor stays open for the lifetime of `self`
            if unsafe { libc::tcflush(self.file.as_raw_fd(), libc::TCIFLUSH) } != 0 {
                return Err(io::Error::last_os_error());
            }
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("uart:{}", self.port)
    }
}
