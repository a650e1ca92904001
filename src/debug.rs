// A single-step debugger over the core's step and PC accessor, driven from
// stdin:
//
//   b <hex-addr>  set a breakpoint
//   c             clear it
//   r             run until the breakpoint
//   s or enter    single-step
//   q             quit
use super::error::Error;
use super::motherboard::MotherBoard;
use std::io::{self, BufRead, Write};

pub struct Debugger {
    mbrd: MotherBoard,
    breakpoint: Option<u16>,
    running: bool,
}

impl Debugger {
    pub fn new(mbrd: MotherBoard) -> Self {
        Self { mbrd, breakpoint: None, running: true }
    }

    pub fn run(&mut self) -> Result<(), Error> {
        println!("Running in debug mode.");
        let stdin = io::stdin();
        while self.running {
            println!("{}", self.mbrd.cpu);
            print!("> ");
            io::stdout().flush()?;
            let mut input = String::new();
            if stdin.lock().read_line(&mut input)? == 0 {
                break;
            }
            let mut args = input.split_whitespace();
            let command = args.next().unwrap_or("");
            self.execute(command, args.next())?;
            println!();
        }
        self.mbrd.sav();
        Ok(())
    }

    fn execute(&mut self, command: &str, arg: Option<&str>) -> Result<(), Error> {
        match command {
            "b" | "break" => match arg.and_then(|a| u16::from_str_radix(a, 16).ok()) {
                Some(address) => {
                    self.breakpoint = Some(address);
                    println!("Breakpoint set: {:#06x}.", address);
                }
                None => println!("You must specify a hex address."),
            },
            "c" | "clear" => {
                self.breakpoint = None;
                println!("Breakpoint cleared.");
            }
            "r" | "run" => match self.breakpoint {
                Some(breakpoint) => {
                    loop {
                        self.mbrd.next()?;
                        if self.mbrd.pc() == breakpoint {
                            break;
                        }
                    }
                    println!("Breakpoint reached.");
                }
                None => println!("You must set a breakpoint first."),
            },
            "" | "s" | "step" => {
                self.mbrd.next()?;
            }
            "q" | "quit" => {
                self.running = false;
                println!("Goodbye!");
            }
            _ => println!("Unknown command."),
        }
        Ok(())
    }
}
