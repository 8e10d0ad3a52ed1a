//! Interactive stdin prompting, capped at a total byte budget for the
//! process's lifetime — the same defense the reference implementation
//! applies by wrapping stdin in an `io.LimitReader` once at startup,
//! rather than per-prompt, so no single run can be coaxed into buffering
//! unbounded input across many reconnect cycles.

use std::io::{self, BufRead, BufReader, Read};

pub struct Prompter {
    reader: BufReader<io::Take<io::Stdin>>,
}

impl Prompter {
    pub fn new(max_total_bytes: u64) -> Prompter {
        Prompter {
            reader: BufReader::new(io::stdin().take(max_total_bytes)),
        }
    }

    pub fn prompt_string(&mut self, prompt: &str) -> io::Result<String> {
        let bytes = self.prompt_bytes(prompt)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Prints `prompt`, reads one line, and returns it with trailing
    /// whitespace trimmed (matching the reference's `bytes.TrimSpace`).
    pub fn prompt_bytes(&mut self, prompt: &str) -> io::Result<Vec<u8>> {
        println!("{prompt}");
        let mut line = Vec::new();
        let read = self.reader.read_until(b'\n', &mut line)?;
        if read == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "input exhausted"));
        }
        while matches!(line.last(), Some(b'\n') | Some(b'\r') | Some(b' ') | Some(b'\t')) {
            line.pop();
        }
        Ok(line)
    }
}
