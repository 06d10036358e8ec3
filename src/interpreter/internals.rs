//! The fixed internal/external call vocabulary (spec.md §4.7): `puts`,
//! `putln`, `putc`, `readc`, `readln`, `readraw`, `system`, and the thin
//! POSIX syscalls. None of these can break/continue/return, so they
//! deal only in `Value`, never `Control`.

use crate::value::{PrimitiveValue, Value};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};

/// Open file handles for `sys_open`/`sys_read`/`sys_write`/`sys_close`.
/// Handles 0/1/2 always alias stdin/stdout/stderr and are never closed.
#[derive(Default)]
pub struct FileTable {
    next_fd: i32,
    open: HashMap<i32, File>,
}

impl FileTable {
    pub fn new() -> Self {
        FileTable { next_fd: 3, open: HashMap::new() }
    }

    pub fn open(&mut self, path: &str, write: bool) -> i32 {
        let result = if write {
            OpenOptions::new().create(true).write(true).truncate(true).open(path)
        } else {
            OpenOptions::new().read(true).open(path)
        };
        match result {
            Ok(file) => {
                let fd = self.next_fd;
                self.next_fd += 1;
                self.open.insert(fd, file);
                fd
            }
            Err(err) => -(err.raw_os_error().unwrap_or(1) as i32),
        }
    }

    pub fn close(&mut self, fd: i32) -> i32 {
        if fd <= 2 {
            return 0;
        }
        if self.open.remove(&fd).is_some() {
            0
        } else {
            -9 // EBADF
        }
    }

    /// Reads up to `count` bytes, returning `(bytes_read_or_negative_errno, data)`.
    pub fn read_bytes(&mut self, fd: i32, count: usize) -> (i64, Vec<u8>) {
        let mut buf = vec![0u8; count];
        let read = if fd == 0 {
            std::io::stdin().read(&mut buf)
        } else {
            match self.open.get_mut(&fd) {
                Some(file) => file.read(&mut buf),
                None => return (-9, Vec::new()),
            }
        };
        match read {
            Ok(n) => {
                buf.truncate(n);
                (n as i64, buf)
            }
            Err(err) => (-(err.raw_os_error().unwrap_or(1) as i64), Vec::new()),
        }
    }

    pub fn write_bytes(&mut self, fd: i32, data: &[u8]) -> i64 {
        let written = if fd == 1 {
            std::io::stdout().write_all(data).map(|_| data.len())
        } else if fd == 2 {
            std::io::stderr().write_all(data).map(|_| data.len())
        } else {
            match self.open.get_mut(&fd) {
                Some(file) => file.write_all(data).map(|_| data.len()),
                None => return -9,
            }
        };
        match written {
            Ok(n) => n as i64,
            Err(err) => -(err.raw_os_error().unwrap_or(1) as i64),
        }
    }
}

fn as_string(value: &Value) -> String {
    match value {
        Value::Primitive(p) => p.to_string(),
        other => other.to_string(),
    }
}

pub fn as_i64(value: &Value) -> i64 {
    value
        .as_primitive()
        .and_then(|p| match p {
            PrimitiveValue::I8(v) => Some(*v as i64),
            PrimitiveValue::I16(v) => Some(*v as i64),
            PrimitiveValue::I32(v) => Some(*v as i64),
            PrimitiveValue::I64(v) => Some(*v),
            PrimitiveValue::U8(v) => Some(*v as i64),
            PrimitiveValue::U16(v) => Some(*v as i64),
            PrimitiveValue::U32(v) => Some(*v as i64),
            PrimitiveValue::U64(v) => Some(*v as i64),
            _ => None,
        })
        .unwrap_or(0)
}

/// Dispatches the fixed-vocabulary internal calls that need nothing
/// beyond their evaluated arguments. `sys_exit`, `sys_read` and
/// `sys_write` are handled directly by the interpreter: the first
/// yields `Control::Exit` rather than a `Value`, and the latter two
/// marshal array/lvalue arguments this module does not see.
pub fn call(files: &mut FileTable, name: &str, args: &[Value]) -> Value {
    match name {
        "puts" => {
            print!("{}", args.get(0).map(as_string).unwrap_or_default());
            Value::void()
        }
        "putln" => {
            println!("{}", args.get(0).map(as_string).unwrap_or_default());
            Value::void()
        }
        "putc" => {
            if let Some(Value::Primitive(PrimitiveValue::Char(c))) = args.get(0) {
                print!("{}", c);
            }
            Value::void()
        }
        "readc" => {
            let mut buf = [0u8; 1];
            match std::io::stdin().read(&mut buf) {
                Ok(1) => Value::Primitive(PrimitiveValue::Char(buf[0] as char)),
                _ => Value::Primitive(PrimitiveValue::Char('\0')),
            }
        }
        "readln" => {
            if let Some(prompt) = args.get(0) {
                print!("{}", as_string(prompt));
                let _ = std::io::stdout().flush();
            }
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).ok();
            if line.ends_with('\n') {
                line.pop();
                if line.ends_with('\r') {
                    line.pop();
                }
            }
            Value::Primitive(PrimitiveValue::String(line))
        }
        "readraw" => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).ok();
            Value::Primitive(PrimitiveValue::String(buf))
        }
        "system" => {
            let command = args.get(0).map(as_string).unwrap_or_default();
            let status = std::process::Command::new("sh").arg("-c").arg(&command).status();
            let code = status.ok().and_then(|s| s.code()).unwrap_or(-1);
            Value::Primitive(PrimitiveValue::I32(code))
        }
        "sys_open" => {
            let path = args.get(0).map(as_string).unwrap_or_default();
            let write = args.get(1).map(as_i64).unwrap_or(0) != 0;
            Value::Primitive(PrimitiveValue::I64(files.open(&path, write) as i64))
        }
        "sys_close" => Value::Primitive(PrimitiveValue::I64(files.close(args.get(0).map(as_i64).unwrap_or(0) as i32) as i64)),
        _ => Value::void(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_on_a_never_opened_descriptor_is_an_error() {
        let mut files = FileTable::new();
        assert_eq!(files.close(7), -9);
    }

    #[test]
    fn standard_descriptors_close_without_effect() {
        let mut files = FileTable::new();
        assert_eq!(files.close(1), 0);
    }
}
