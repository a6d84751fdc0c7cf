//! Man page generator for nordump
//!
//! Usage: cargo run --bin gen-manpage -- [output-dir]
//!
//! Renders the options from the clap definition and appends the board file
//! format, the backends and a few bench recipes.

use clap::CommandFactory;
use std::fs;
use std::path::PathBuf;

#[allow(dead_code)]
#[path = "../cli.rs"]
mod cli;

/// Sections clap does not know about, in roff
const EXTRA_SECTIONS: &str = r#".SH BACKENDS
.TP
\fBlinux_gpio\fR[:\fBdev\fR=\fI/dev/gpiochipN\fR|\fBgpiochip\fR=\fIN\fR]
GPIO character device. Defaults to /dev/gpiochip0.
.TP
\fBdummy\fR[:\fBloopback\fR,\fBsize\fR=\fIN\fR]
Simulated bench with an in-memory flash chip. \fBloopback\fR ties the
shift-register outputs to DQ0-DQ7 for the address test.
.SH BOARD FILE
Without \fB--config\fR the reference Raspberry Pi wiring is used: DQ0-DQ7 on
GPIO 2, 3, 4, 17, 18, 27, 22, 23, OE# on 24, WE# on 10, address shift data
on 9 and shift clock on 25, 24 address bits. A board file overrides any part
of it:
.PP
.nf
[pins]
data = [2, 3, 4, 17, 18, 27, 22, 23]
output_enable = 24
write_enable = 10

[addressing]
mode = "serial"        # serial, latched or direct
data = 9
clock = 25
bits = 24

[timing]
pulse_us = 2
settle_us = 100
setup_us = 10

[chip]
max_address = "0xFFFFFF"
.fi
.SH EXAMPLES
.TP
\fBnordump -d\fR
Read the manufacturer and device IDs.
.TP
\fBnordump -p linux_gpio:gpiochip=1 flash.bin\fR
Dump the whole chip on the second GPIO chip.
.TP
\fBnordump --max-address 0xFFFF flash.bin\fR
Dump the first 64 KiB only.
.TP
\fBnordump -e --cycles 10\fR
Toggle OE# ten times, then exit.
.SH EXIT STATUS
0 on success, 1 on a usage error, a failed file open or write, a GPIO
initialization failure, a failed address test or a chip that does not
answer the ID query.
"#;

fn main() -> std::io::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    // Default to ./man directory
    let output_dir = if args.len() > 1 {
        PathBuf::from(&args[1])
    } else {
        PathBuf::from("man")
    };

    fs::create_dir_all(&output_dir)?;

    let cmd = cli::Cli::command();
    let man = clap_mangen::Man::new(cmd).manual("nordump Manual");
    let mut buffer = Vec::new();
    man.render(&mut buffer)?;
    buffer.extend_from_slice(EXTRA_SECTIONS.as_bytes());

    let output_path = output_dir.join("nordump.1");
    fs::write(&output_path, buffer)?;

    println!("Man page generated at: {}", output_path.display());
    Ok(())
}
