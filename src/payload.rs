//! Payload composition: wrap a caller fragment so that running it invokes
//! `solution` and prints the result.

/// Bytes fed to the environment's standard input. Immutable once composed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload(Vec<u8>);

impl Payload {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

const INTERPRETED_TRAILER: &str = "\n\n\
import inspect, asyncio\n\
fn = globals().get('solution')\n\
if callable(fn):\n    \
res = (asyncio.run(fn()) if inspect.iscoroutinefunction(fn) else fn())\n    \
print(res)\n";

const EMULATED_PRELUDE: &str = "\
.text\n\
.globl solution\n\
.type solution, @function\n";

// rv64 entry point. Calls `solution`, formats a0 as signed decimal into a
// 64-byte bss buffer (newline at buf+63, digits written backwards), then
// write(1, ..) (syscall 64) and exit(0) (syscall 93).
//
//   t0 value/magnitude   t1 newline slot   t2 cursor   t3 negative flag
//   t4 radix             t5 quotient/len   t6 scratch char
const EMULATED_TRAILER: &str = "
.section .text
.globl _start
_start:
    call solution
    mv t0, a0
    la t1, buf
    addi t1, t1, 63
    li t6, 10
    sb t6, 0(t1)
    addi t2, t1, -1
    beqz t0, 1f
    li t3, 0
    bge t0, x0, 2f
    neg t0, t0
    li t3, 1
2:
    li t4, 10
0:
    divu t5, t0, t4
    remu t6, t0, t4
    addi t6, t6, '0'
    sb t6, 0(t2)
    addi t2, t2, -1
    mv t0, t5
    bnez t0, 0b
    beqz t3, 3f
    li t6, '-'
    sb t6, 0(t2)
    addi t2, t2, -1
    j 3f
1:
    li t6, '0'
    sb t6, 0(t2)
    addi t2, t2, -1
3:
    addi t2, t2, 1
    sub t5, t1, t2
    addi t5, t5, 1
    li a0, 1
    mv a1, t2
    mv a2, t5
    li a7, 64
    ecall
    li a0, 0
    li a7, 93
    ecall
.section .bss
.lcomm buf, 64
";

/// Python fragment followed by a trailer that calls `solution` if it is
/// defined, awaiting it when it is a coroutine function.
pub fn compose_interpreted(fragment: &[u8]) -> Payload {
    let mut bytes = Vec::with_capacity(fragment.len() + INTERPRETED_TRAILER.len());
    bytes.extend_from_slice(fragment);
    bytes.extend_from_slice(INTERPRETED_TRAILER.as_bytes());
    Payload(bytes)
}

/// RISC-V assembly fragment between a prelude exporting `solution` and a
/// freestanding `_start` that prints its return value. Links with
/// `-nostdlib -static`; a fragment without `solution` fails to link.
pub fn compose_emulated(fragment: &[u8]) -> Payload {
    let mut bytes =
        Vec::with_capacity(EMULATED_PRELUDE.len() + fragment.len() + EMULATED_TRAILER.len());
    bytes.extend_from_slice(EMULATED_PRELUDE.as_bytes());
    bytes.extend_from_slice(fragment);
    bytes.extend_from_slice(EMULATED_TRAILER.as_bytes());
    Payload(bytes)
}
