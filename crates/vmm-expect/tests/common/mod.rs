//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use vmm_expect::{SessionConfig, TimeoutConfig, Transport};

/// A `/bin/sh -c` session over pipes.
pub fn sh(script: &str) -> SessionConfig {
    SessionConfig::new("/bin/sh")
        .args(["-c", script])
        .transport(Transport::Pipe)
        .expect_timeout(Duration::from_secs(3))
}

/// A `/bin/sh -c` session on a pseudo-terminal.
pub fn sh_pty(script: &str) -> SessionConfig {
    SessionConfig::new("/bin/sh")
        .args(["-c", script])
        .expect_timeout(Duration::from_secs(3))
}

/// Timeouts short enough for tests.
pub fn quick_timeouts() -> TimeoutConfig {
    TimeoutConfig::new()
        .expect(Duration::from_secs(3))
        .scenario(Duration::from_secs(20))
        .grace(Duration::from_millis(300))
}

/// A fresh scratch path under the system temp directory.
pub fn scratch(name: &str) -> PathBuf {
    static NEXT: AtomicUsize = AtomicUsize::new(0);
    let n = NEXT.fetch_add(1, Ordering::SeqCst);
    std::env::temp_dir().join(format!("vmm-expect-{}-{n}-{name}", std::process::id()))
}

/// A stand-in for the monitor's gdb stub.
///
/// Waits for `$FLAG` (created by the fake debugger on attach), then for
/// `$FLAG.quit` or `$FLAG.done`.
pub const FAKE_MONITOR: &str = r#"
echo 'Solo5: Waiting for a debugger. Try: gdb -ex "target remote localhost:1234"'
while [ ! -e "$FLAG" ]; do sleep 0.02; done
echo 'Solo5: Connection from debugger at 127.0.0.1'
while [ ! -e "$FLAG.quit" ] && [ ! -e "$FLAG.done" ]; do sleep 0.02; done
if [ -e "$FLAG.quit" ]; then
    echo 'Solo5: Debugger asked us to quit. Exiting'
    exit 1
fi
echo 'Hello, World'
if [ -n "$HANG" ]; then exec sleep 30; fi
exit 0
"#;

/// A stand-in for gdb that understands break, c, quit and one query.
pub const FAKE_DEBUGGER: &str = r#"
echo 'Remote debugging using localhost:1234'
touch "$FLAG"
bp=0
hits=0
while read -r line; do
    case "$line" in
        break*)
            bp=$((bp + 1))
            echo "Breakpoint $bp at 0x100a10: file test_hello.c, line 12."
            ;;
        c)
            if [ "$hits" -lt "$bp" ]; then
                hits=$((hits + 1))
                echo "Breakpoint $hits, solo5_app_main () at test_hello.c:12"
            else
                touch "$FLAG.done"
                echo '[Inferior 1 (Remote target) exited normally]'
            fi
            ;;
        quit)
            echo 'A debugging session is active. Quit anyway? (y or n) '
            read -r answer
            if [ "$answer" = y ]; then
                touch "$FLAG.quit"
                exit 0
            fi
            ;;
        'info local')
            echo 'len = 12'
            ;;
        *)
            echo "Undefined command: \"$line\".  Try \"help\"."
            ;;
    esac
done
"#;
