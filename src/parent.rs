//! Parent-death detection (§5, §6): the coordinator runs as a child of the
//! main service daemon and watches a pipe fd inherited from it; read-
//! readiness on that fd means the parent died, and the coordinator must
//! `_exit(1)` immediately rather than unwind.

pub trait ParentMonitor: Send {
    /// `false` once the parent is known to be gone.
    fn is_parent_alive(&mut self) -> bool;
}

#[cfg(unix)]
pub mod unix {
    use std::os::unix::io::RawFd;

    use super::ParentMonitor;

    /// Polls a pipe fd inherited from the parent process. The parent holds
    /// the write end open for as long as it lives; its death closes the
    /// pipe, which shows up here as read-readiness (EOF).
    pub struct PipeParentMonitor {
        fd: RawFd,
    }

    impl PipeParentMonitor {
        pub fn new(fd: RawFd) -> Self { PipeParentMonitor { fd } }
    }

    impl ParentMonitor for PipeParentMonitor {
        fn is_parent_alive(&mut self) -> bool {
            let mut pfd = libc::pollfd { fd: self.fd, events: libc::POLLIN, revents: 0 };
            let rc = unsafe { libc::poll(&mut pfd, 1, 0) };
            if rc <= 0 {
                return true;
            }
            if pfd.revents & (libc::POLLHUP | libc::POLLERR) != 0 {
                return false;
            }
            if pfd.revents & libc::POLLIN != 0 {
                let mut buf = [0u8; 1];
                let n = unsafe { libc::read(self.fd, buf.as_mut_ptr() as *mut libc::c_void, 1) };
                return n != 0;
            }
            true
        }
    }
}

/// Runs on its own thread; exits the process the instant the parent is
/// observed to be gone (§5 "parent death triggers immediate `_exit`").
pub fn watch(mut monitor: Box<dyn ParentMonitor>, poll_interval: std::time::Duration) {
    std::thread::spawn(move || loop {
        if !monitor.is_parent_alive() {
            std::process::exit(1);
        }
        std::thread::sleep(poll_interval);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlagMonitor(std::sync::Arc<std::sync::atomic::AtomicBool>);

    impl ParentMonitor for FlagMonitor {
        fn is_parent_alive(&mut self) -> bool { self.0.load(std::sync::atomic::Ordering::SeqCst) }
    }

    #[test]
    fn flag_monitor_reflects_shared_state() {
        let alive = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(true));
        let mut monitor = FlagMonitor(alive.clone());
        assert!(monitor.is_parent_alive());
        alive.store(false, std::sync::atomic::Ordering::SeqCst);
        assert!(!monitor.is_parent_alive());
    }
}
