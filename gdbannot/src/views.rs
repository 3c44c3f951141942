//! Cached views and the parsers that fill them
//!
//! Each view keeps the raw capture of its last refresh next to a structured
//! form parsed from gdb's CLI output.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::types::*;

static BREAKPOINT_ROW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(\d+(?:\.\d+)?)\s+((?:hw |read |acc )?(?:breakpoint|watchpoint|catchpoint|dprintf)|\S+)\s+(keep|del|dis)\s+([yn])\s+(?:(0x[0-9a-fA-F]+|<PENDING>|<MULTIPLE>)\s*)?(.*)$",
    )
    .expect("valid regex")
});
static LOCATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:in (\S+) )?at (.+):(\d+)$").expect("valid regex"));
static HIT_COUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"already hit (\d+) times?").expect("valid regex"));
static FRAME_LEVEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Stack level (\d+)").expect("valid regex"));
static FRAME_PC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*\w+ = (0x[0-9a-fA-F]+)(?: in (\S+?)(?: \((.+):(\d+)\))?)?;").expect("valid regex")
});
static STACK_ROW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^#(\d+)\s+(?:(0x[0-9a-fA-F]+) in )?(\S+)(.*)$").expect("valid regex")
});
static LIBRARY: Lazy<Regex> = Lazy::new(|| Regex::new(r" from (\S+)$").expect("valid regex"));
static LOCAL_ROW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z_$][\w$:<>]*) = (.*)$").expect("valid regex"));
static REGISTER_ROW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\w+)\s+(0x[0-9a-fA-F]+|-?\d\S*|[{\[]\S*)\s+(.*)$").expect("valid regex"));
static THREAD_ROW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\*)?\s*(\d+(?:\.\d+)?)\s+(.*)$").expect("valid regex"));
static ASSEMBLY_ROW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(=>)?\s*(0x[0-9a-fA-F]+)\s*(?:<([^>]*)>)?:\s*(.*)$").expect("valid regex")
});
static MEMORY_ROW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(0x[0-9a-fA-F]+)\s*(?:<([^>]*)>)?:\s*(.*)$").expect("valid regex")
});

/// Backing store of every cached view
#[derive(Debug, Clone, Default, Serialize)]
pub struct ViewStore {
    #[serde(skip)]
    raw: HashMap<ViewKind, String>,
    pub frame: Option<SelectedFrame>,
    pub breakpoints: Vec<Breakpoint>,
    /// Breakpoint lines per source file
    pub breakpoint_lines: BTreeMap<String, BTreeSet<u32>>,
    pub stack: Vec<StackFrame>,
    pub locals: Vec<Local>,
    pub registers: Vec<Register>,
    pub threads: Vec<ThreadInfo>,
    pub disassembly: Vec<AssemblyLine>,
    pub memory: Vec<MemoryRow>,
    pub source: SourceInfo,
}

impl ViewStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw capture of the last refresh of `kind`
    pub fn raw(&self, kind: ViewKind) -> Option<&str> {
        self.raw.get(&kind).map(String::as_str)
    }

    /// Store a capture and rebuild the structured form of `kind`
    pub fn apply(&mut self, kind: ViewKind, capture: &str) {
        self.raw.insert(kind, capture.to_string());

        match kind {
            ViewKind::Frame => {
                self.frame = parse_frame(capture);
                self.mark_selected_frame();
            }
            ViewKind::Breakpoints => {
                self.breakpoints = parse_breakpoints(capture);
                self.breakpoint_lines = breakpoint_lines(&self.breakpoints);
            }
            ViewKind::Stack => {
                self.stack = parse_stack(capture);
                self.mark_selected_frame();
            }
            ViewKind::Locals => self.locals = parse_locals(capture),
            ViewKind::Registers => {
                self.registers = merge_registers(&self.registers, parse_registers(capture));
            }
            ViewKind::Memory => self.memory = parse_memory(capture),
            ViewKind::Threads => self.threads = parse_threads(capture),
            ViewKind::Disassembly => {
                let pc = self.frame.as_ref().and_then(|f| f.pc.clone());
                self.disassembly = parse_disassembly(capture, pc.as_deref());
            }
        }
    }

    /// Breakpoint lines for a file, matched on full path or base name
    pub fn breakpoints_in(&self, file: &str) -> BTreeSet<u32> {
        let base = base_name(file);
        self.breakpoint_lines
            .iter()
            .filter(|(bp_file, _)| bp_file.as_str() == file || base_name(bp_file) == base)
            .flat_map(|(_, lines)| lines.iter().copied())
            .collect()
    }

    /// Forget every view, keeping nothing from the previous session
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn mark_selected_frame(&mut self) {
        let level = self.frame.as_ref().map(|f| f.level);
        for frame in &mut self.stack {
            frame.selected = Some(frame.level) == level;
        }
    }
}

fn base_name(path: &str) -> &str {
    path.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(path)
}

/// Parse `info breakpoints`
pub fn parse_breakpoints(capture: &str) -> Vec<Breakpoint> {
    let mut breakpoints: Vec<Breakpoint> = Vec::new();

    for line in capture.lines() {
        if let Some(caps) = BREAKPOINT_ROW.captures(line) {
            let what = caps.get(6).map(|m| m.as_str().trim().to_string()).unwrap_or_default();
            let location = LOCATION.captures(&what);

            breakpoints.push(Breakpoint {
                number: caps[1].to_string(),
                breakpoint_type: caps[2].to_string(),
                disposition: caps[3].to_string(),
                enabled: &caps[4] == "y",
                address: caps.get(5).map(|m| m.as_str().to_string()),
                function: location
                    .as_ref()
                    .and_then(|l| l.get(1))
                    .map(|m| m.as_str().to_string()),
                file: location.as_ref().map(|l| l[2].to_string()),
                line: location.as_ref().and_then(|l| l[3].parse().ok()),
                what,
                times: 0,
            });
        } else if let Some(caps) = HIT_COUNT.captures(line) {
            if let Some(last) = breakpoints.last_mut() {
                last.times = caps[1].parse().unwrap_or(0);
            }
        }
    }

    breakpoints
}

/// Map each source file to the lines carrying an enabled breakpoint
pub fn breakpoint_lines(breakpoints: &[Breakpoint]) -> BTreeMap<String, BTreeSet<u32>> {
    let mut lines: BTreeMap<String, BTreeSet<u32>> = BTreeMap::new();

    for bp in breakpoints.iter().filter(|bp| bp.enabled) {
        if let (Some(file), Some(line)) = (&bp.file, bp.line) {
            lines.entry(file.clone()).or_default().insert(line);
        }
    }

    lines
}

/// Parse `info frame`; `None` when there is no stack
pub fn parse_frame(capture: &str) -> Option<SelectedFrame> {
    let mut frame: Option<SelectedFrame> = None;

    for line in capture.lines() {
        if let Some(caps) = FRAME_LEVEL.captures(line) {
            frame = Some(SelectedFrame {
                level: caps[1].parse().ok()?,
                pc: None,
                function: None,
                file: None,
                line: None,
            });
        } else if let (Some(caps), Some(frame)) = (FRAME_PC.captures(line), frame.as_mut()) {
            if frame.pc.is_none() {
                frame.pc = Some(caps[1].to_string());
                frame.function = caps.get(2).map(|m| m.as_str().to_string());
                frame.file = caps.get(3).map(|m| m.as_str().to_string());
                frame.line = caps.get(4).and_then(|m| m.as_str().parse().ok());
            }
        }
    }

    frame
}

/// Parse `info stack`
pub fn parse_stack(capture: &str) -> Vec<StackFrame> {
    capture
        .lines()
        .filter_map(|line| {
            let caps = STACK_ROW.captures(line)?;
            let rest = caps.get(4).map(|m| m.as_str()).unwrap_or_default();
            let location = LOCATION.captures(rest);

            Some(StackFrame {
                level: caps[1].parse().ok()?,
                address: caps.get(2).map(|m| m.as_str().to_string()),
                function: caps[3].to_string(),
                file: location.as_ref().map(|l| l[2].to_string()),
                line: location.as_ref().and_then(|l| l[3].parse().ok()),
                library: LIBRARY.captures(rest).map(|l| l[1].to_string()),
                selected: false,
            })
        })
        .collect()
}

/// Parse `info locals`, folding multi-line aggregate values into one entry
pub fn parse_locals(capture: &str) -> Vec<Local> {
    let mut locals: Vec<Local> = Vec::new();

    for line in capture.lines() {
        if let Some(caps) = LOCAL_ROW.captures(line) {
            let value = caps[2].to_string();
            locals.push(Local {
                name: caps[1].to_string(),
                complex: value.starts_with('{'),
                value,
            });
        } else if let Some(last) = locals.last_mut() {
            if !line.trim().is_empty() {
                last.value.push('\n');
                last.value.push_str(line);
            }
        }
    }

    locals
}

/// Parse `info registers`
pub fn parse_registers(capture: &str) -> Vec<Register> {
    capture
        .lines()
        .filter_map(|line| {
            let caps = REGISTER_ROW.captures(line)?;
            Some(Register {
                name: caps[1].to_string(),
                raw: caps[2].to_string(),
                natural: caps[3].trim_end().to_string(),
                changed: false,
            })
        })
        .collect()
}

/// Flag registers whose raw value differs from the previous refresh
pub fn merge_registers(previous: &[Register], mut current: Vec<Register>) -> Vec<Register> {
    let old: HashMap<&str, &str> = previous
        .iter()
        .map(|r| (r.name.as_str(), r.raw.as_str()))
        .collect();

    for register in &mut current {
        register.changed = old
            .get(register.name.as_str())
            .is_some_and(|raw| *raw != register.raw);
    }

    current
}

/// Parse `info threads`
pub fn parse_threads(capture: &str) -> Vec<ThreadInfo> {
    capture
        .lines()
        .filter_map(|line| {
            let caps = THREAD_ROW.captures(line)?;
            let details = caps[3].trim_end().to_string();
            let location = LOCATION.captures(&details);

            Some(ThreadInfo {
                id: caps[2].to_string(),
                current: caps.get(1).is_some(),
                file: location.as_ref().map(|l| l[2].to_string()),
                line: location.as_ref().and_then(|l| l[3].parse().ok()),
                details,
            })
        })
        .collect()
}

/// Parse `disassemble`, marking the instruction at `pc`
pub fn parse_disassembly(capture: &str, pc: Option<&str>) -> Vec<AssemblyLine> {
    let pc = pc.and_then(hex_value);

    capture
        .lines()
        .filter_map(|line| {
            let caps = ASSEMBLY_ROW.captures(line)?;
            let address = caps[2].to_string();
            let current = caps.get(1).is_some() || (pc.is_some() && hex_value(&address) == pc);

            Some(AssemblyLine {
                location: caps.get(3).map(|m| m.as_str().to_string()),
                instruction: caps[4].trim_end().to_string(),
                address,
                current,
            })
        })
        .collect()
}

/// Parse an `x` memory dump
pub fn parse_memory(capture: &str) -> Vec<MemoryRow> {
    capture
        .lines()
        .filter_map(|line| {
            let caps = MEMORY_ROW.captures(line)?;
            Some(MemoryRow {
                address: caps[1].to_string(),
                label: caps.get(2).map(|m| m.as_str().to_string()),
                words: caps[3].split_whitespace().map(str::to_string).collect(),
            })
        })
        .collect()
}

/// Parse `info source`
pub fn parse_source_info(capture: &str) -> SourceInfo {
    let mut info = SourceInfo::default();

    for line in capture.lines() {
        if let Some(file) = line.strip_prefix("Current source file is ") {
            info.file = Some(file.trim().to_string());
        } else if let Some(fullname) = line.strip_prefix("Located in ") {
            info.fullname = Some(fullname.trim().to_string());
        } else if line.starts_with("Includes preprocessor macro info") {
            info.macro_info = true;
        }
    }

    info
}

fn hex_value(text: &str) -> Option<u64> {
    u64::from_str_radix(text.trim_start_matches("0x"), 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BREAKPOINTS: &str = "\
Num     Type           Disp Enb Address            What
1       breakpoint     keep y   0x0000000000401136 in main at prog.c:12
\tbreakpoint already hit 2 times
2       breakpoint     keep n   0x0000000000401150 in helper at src/util.c:40
3       hw watchpoint  keep y                      counter
";

    #[test]
    fn test_parse_breakpoints() {
        let bps = parse_breakpoints(BREAKPOINTS);

        assert_eq!(bps.len(), 3);
        assert_eq!(bps[0].number, "1");
        assert_eq!(bps[0].function.as_deref(), Some("main"));
        assert_eq!(bps[0].file.as_deref(), Some("prog.c"));
        assert_eq!(bps[0].line, Some(12));
        assert_eq!(bps[0].times, 2);
        assert!(!bps[1].enabled);
        assert_eq!(bps[2].breakpoint_type, "hw watchpoint");
        assert_eq!(bps[2].address, None);
        assert_eq!(bps[2].what, "counter");
    }

    #[test]
    fn test_breakpoint_lines_only_enabled() {
        let mut store = ViewStore::new();
        store.apply(ViewKind::Breakpoints, BREAKPOINTS);

        assert_eq!(store.breakpoints_in("/home/u/prog.c"), BTreeSet::from([12]));
        assert!(store.breakpoints_in("util.c").is_empty());
    }

    #[test]
    fn test_no_breakpoints() {
        assert!(parse_breakpoints("No breakpoints or watchpoints.\n").is_empty());
    }

    #[test]
    fn test_parse_frame() {
        let frame = parse_frame(
            "Stack level 1, frame at 0x7fffffffe100:\n rip = 0x401189 in compute (prog.c:27); saved rip = 0x4011c0\n caller of frame at 0x7fffffffe0e0\n",
        )
        .unwrap();

        assert_eq!(frame.level, 1);
        assert_eq!(frame.pc.as_deref(), Some("0x401189"));
        assert_eq!(frame.function.as_deref(), Some("compute"));
        assert_eq!(frame.file.as_deref(), Some("prog.c"));
        assert_eq!(frame.line, Some(27));
        assert_eq!(parse_frame("No stack.\n"), None);
    }

    #[test]
    fn test_stack_marks_selected_frame() {
        let mut store = ViewStore::new();
        store.apply(
            ViewKind::Frame,
            "Stack level 1, frame at 0x7fffffffe100:\n rip = 0x401189 in compute (prog.c:27); saved rip = 0x4011c0\n",
        );
        store.apply(
            ViewKind::Stack,
            "#0  leaf (n=3) at prog.c:8\n#1  0x0000000000401189 in compute (x=1) at prog.c:27\n#2  0x00007ffff7a2d830 in __libc_start_main () from /lib/libc.so.6\n",
        );

        assert_eq!(store.stack.len(), 3);
        assert_eq!(store.stack[0].function, "leaf");
        assert_eq!(store.stack[0].line, Some(8));
        assert!(store.stack[1].selected);
        assert!(!store.stack[0].selected);
        assert_eq!(store.stack[1].address.as_deref(), Some("0x0000000000401189"));
        assert_eq!(store.stack[2].library.as_deref(), Some("/lib/libc.so.6"));
    }

    #[test]
    fn test_parse_locals_multi_line() {
        let locals = parse_locals("i = 4\np = {x = 1,\n  y = 2}\nname = 0x402004 \"abc\"\n");

        assert_eq!(locals.len(), 3);
        assert!(locals[1].complex);
        assert_eq!(locals[1].value, "{x = 1,\n  y = 2}");
        assert_eq!(locals[2].name, "name");
        assert!(parse_locals("No locals.\n").is_empty());
    }

    #[test]
    fn test_register_deltas() {
        let first = parse_registers("rax            0x1c                28\nrip            0x401136            0x401136 <main+4>\n");
        let merged = merge_registers(&[], first);
        assert!(merged.iter().all(|r| !r.changed));

        let second = parse_registers("rax            0x1c                28\nrip            0x40113a            0x40113a <main+8>\n");
        let merged = merge_registers(&merged, second);
        assert!(!merged[0].changed);
        assert!(merged[1].changed);
        assert_eq!(merged[1].natural, "0x40113a <main+8>");
    }

    #[test]
    fn test_parse_threads() {
        let threads = parse_threads(
            "  Id   Target Id                          Frame \n* 1    Thread 0x7ffff7d89740 (LWP 11) \"prog\" main () at prog.c:12\n  2    Thread 0x7ffff7588700 (LWP 12) \"prog\" 0x00007ffff7bc4a35 in pthread_cond_wait () from /lib/libpthread.so.0\n",
        );

        assert_eq!(threads.len(), 2);
        assert!(threads[0].current);
        assert_eq!(threads[0].line, Some(12));
        assert!(!threads[1].current);
        assert_eq!(threads[1].file, None);
    }

    #[test]
    fn test_parse_disassembly_marks_pc() {
        let capture = "Dump of assembler code for function main:\n   0x0000000000401132 <+0>:\tpush   %rbp\n   0x0000000000401133 <+1>:\tmov    %rsp,%rbp\n   0x0000000000401136 <+4>:\tmov    $0x0,%eax\nEnd of assembler dump.\n";
        let lines = parse_disassembly(capture, Some("0x401136"));

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].location.as_deref(), Some("+0"));
        assert_eq!(lines[0].instruction, "push   %rbp");
        assert!(lines[2].current);
        assert!(!lines[0].current);
    }

    #[test]
    fn test_parse_disassembly_arrow() {
        let lines = parse_disassembly("=> 0x0000000000401136 <+4>:\tmov    $0x0,%eax\n", None);
        assert!(lines[0].current);
    }

    #[test]
    fn test_parse_memory() {
        let rows = parse_memory("0x601040 <buf>:\t0x00000001\t0x00000002\n0x601048 <buf+8>:\t0x00000003\t0x00000004\n");

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].label.as_deref(), Some("buf"));
        assert_eq!(rows[1].words, vec!["0x00000003", "0x00000004"]);
    }

    #[test]
    fn test_parse_source_info() {
        let info = parse_source_info(
            "Current source file is prog.c\nCompilation directory is /home/u\nLocated in /home/u/prog.c\nContains 40 lines.\nSource language is c.\nIncludes preprocessor macro info.\n",
        );

        assert_eq!(info.file.as_deref(), Some("prog.c"));
        assert_eq!(info.fullname.as_deref(), Some("/home/u/prog.c"));
        assert!(info.macro_info);
    }
}
