//! OS pipes and descriptor plumbing for the encoder process

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use tokio::net::unix::pipe;
use tokio::process::Command;

/// First descriptor number after stdin, stdout and stderr
pub const FIRST_EXTRA_DESCRIPTOR: RawFd = 3;

/// Hands out process-visible descriptor numbers in order. The Nth pipe
/// becomes descriptor `FIRST_EXTRA_DESCRIPTOR + N` in the child, which is
/// what the encoder's `pipe:N` syntax refers to.
#[derive(Debug)]
pub struct DescriptorAllocator {
    next: RawFd,
}

impl DescriptorAllocator {
    pub fn new() -> Self {
        Self {
            next: FIRST_EXTRA_DESCRIPTOR,
        }
    }

    pub fn allocate(&mut self) -> RawFd {
        let fd = self.next;
        self.next += 1;
        fd
    }

    /// Lowest descriptor number not handed out yet
    pub fn high_water(&self) -> RawFd {
        self.next
    }
}

impl Default for DescriptorAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Child side of one pipe, installed at `descriptor` when the process starts
#[derive(Debug)]
pub struct PipeEndpoint {
    pub descriptor: RawFd,
    /// `-i` position for input pipes
    pub input_index: Option<usize>,
    child_end: OwnedFd,
}

impl PipeEndpoint {
    /// Encoder URL for this endpoint
    pub fn url(&self) -> String {
        format!("pipe:{}", self.descriptor)
    }
}

fn cvt(ret: libc::c_int) -> io::Result<libc::c_int> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

/// Anonymous pipe, both ends close-on-exec. Returns (read, write).
fn cloexec_pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    let mut fds = [0 as libc::c_int; 2];

    #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
    // SAFETY: fds points to two writable ints
    cvt(unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) })?;

    #[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
    {
        // SAFETY: fds points to two writable ints
        cvt(unsafe { libc::pipe(fds.as_mut_ptr()) })?;
        for fd in fds {
            // SAFETY: fd was just returned by pipe
            cvt(unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) })?;
        }
    }

    // SAFETY: both descriptors are fresh and owned by nobody else
    Ok(unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) })
}

/// Duplicate `fd` onto the lowest free number >= `min`, close-on-exec, so that
/// installing child descriptors below `min` can never clobber it.
fn raise(fd: OwnedFd, min: RawFd) -> io::Result<OwnedFd> {
    if fd.as_raw_fd() >= min {
        return Ok(fd);
    }
    // SAFETY: fd is a valid open descriptor
    let raised = cvt(unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_DUPFD_CLOEXEC, min) })?;
    // SAFETY: raised is a fresh descriptor from fcntl
    Ok(unsafe { OwnedFd::from_raw_fd(raised) })
}

/// Pipe the child reads from. The engine writes through the returned sender.
pub fn input_pipe(
    descriptor: RawFd,
    input_index: usize,
    reserved: RawFd,
) -> io::Result<(PipeEndpoint, pipe::Sender)> {
    let (read, write) = cloexec_pipe()?;
    let endpoint = PipeEndpoint {
        descriptor,
        input_index: Some(input_index),
        child_end: raise(read, reserved)?,
    };
    Ok((endpoint, pipe::Sender::from_owned_fd(write)?))
}

/// Pipe the child writes to. The engine reads through the returned receiver.
pub fn output_pipe(descriptor: RawFd, reserved: RawFd) -> io::Result<(PipeEndpoint, pipe::Receiver)> {
    let (read, write) = cloexec_pipe()?;
    let endpoint = PipeEndpoint {
        descriptor,
        input_index: None,
        child_end: raise(write, reserved)?,
    };
    Ok((endpoint, pipe::Receiver::from_owned_fd(read)?))
}

/// Make every endpoint visible to the child at its descriptor number.
/// The endpoints must stay alive until the command is spawned.
pub fn install(command: &mut Command, endpoints: &[PipeEndpoint]) {
    let mapping: Vec<(RawFd, RawFd)> = endpoints
        .iter()
        .map(|e| (e.child_end.as_raw_fd(), e.descriptor))
        .collect();
    if mapping.is_empty() {
        return;
    }

    // SAFETY: the closure only calls dup2, which is async-signal-safe, and
    // does not allocate. Sources are all >= the reserved range (see `raise`)
    // so no dup2 overwrites a source that is still needed; dup2 clears
    // close-on-exec on the target so it survives exec.
    unsafe {
        command.pre_exec(move || {
            for &(source, target) in &mapping {
                cvt(libc::dup2(source, target))?;
            }
            Ok(())
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocator_counts_from_first_extra_descriptor() {
        let mut allocator = DescriptorAllocator::new();
        assert_eq!(allocator.allocate(), 3);
        assert_eq!(allocator.allocate(), 4);
        assert_eq!(allocator.high_water(), 5);
    }

    #[tokio::test]
    async fn test_child_ends_are_raised_above_reserved_range() {
        let reserved = 64;
        let (input, _sender) = input_pipe(3, 0, reserved).unwrap();
        let (output, _receiver) = output_pipe(4, reserved).unwrap();

        assert!(input.child_end.as_raw_fd() >= reserved);
        assert!(output.child_end.as_raw_fd() >= reserved);
        assert_eq!(input.url(), "pipe:3");
        assert_eq!(input.input_index, Some(0));
        assert_eq!(output.input_index, None);
    }
}
