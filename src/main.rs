use beemo::debug::Debugger;
use beemo::motherboard::MotherBoard;

fn parse_args() -> (String, String, u32, bool) {
    let mut rom = String::new();
    let mut bootrom = String::from("roms/bootrom.gb");
    let mut scale = 2u32;
    let mut debug = false;
    {
        let mut ap = argparse::ArgumentParser::new();
        ap.set_description("BMO, a handheld console emulator");
        ap.refer(&mut rom).add_option(&["--rom"], argparse::Store, "Rom file").required();
        ap.refer(&mut bootrom).add_option(&["--bootrom"], argparse::Store, "Bootrom file");
        ap.refer(&mut scale).add_option(&["--scale"], argparse::Store, "Scale the video by a factor of 1, 2, 4 or 8");
        ap.refer(&mut debug).add_option(&["--debug"], argparse::StoreTrue, "Run the interactive debugger");
        ap.parse_args_or_exit();
    }
    (rom, bootrom, scale, debug)
}

fn fatal(e: impl std::fmt::Display) -> ! {
    rog::println!("{}", e);
    std::process::exit(1)
}

#[cfg(feature = "gui")]
fn main() {
    use beemo::joypad::JoypadKey;
    use beemo::ppu::{SCREEN_H, SCREEN_W};

    rog::reg("beemo");
    rog::reg("beemo::cartridge");

    let (rom, bootrom, scale, debug) = parse_args();
    let mut mbrd = match MotherBoard::power_up(rom, bootrom) {
        Ok(mbrd) => mbrd,
        Err(e) => fatal(e),
    };

    if debug {
        let mut debugger = Debugger::new(mbrd);
        if let Err(e) = debugger.run() {
            fatal(e);
        }
        return;
    }

    let mut option = minifb::WindowOptions::default();
    option.resize = true;
    option.scale = match scale {
        1 => minifb::Scale::X1,
        2 => minifb::Scale::X2,
        4 => minifb::Scale::X4,
        8 => minifb::Scale::X8,
        _ => fatal("Supported scale: 1, 2, 4 or 8"),
    };
    let title = format!("BMO - {}", mbrd.title());
    let mut window = match minifb::Window::new(title.as_str(), SCREEN_W, SCREEN_H, option) {
        Ok(window) => window,
        Err(e) => fatal(e),
    };
    let mut window_buffer = vec![0x00u32; SCREEN_W * SCREEN_H];
    window.update_with_buffer(window_buffer.as_slice()).unwrap();

    let keys = [
        (minifb::Key::Right, JoypadKey::Right),
        (minifb::Key::Left, JoypadKey::Left),
        (minifb::Key::Up, JoypadKey::Up),
        (minifb::Key::Down, JoypadKey::Down),
        (minifb::Key::Z, JoypadKey::A),
        (minifb::Key::X, JoypadKey::B),
        (minifb::Key::Space, JoypadKey::Select),
        (minifb::Key::Enter, JoypadKey::Start),
    ];
    // Releasing a key raises the joypad interrupt, so only edges are fed to
    // the core.
    let mut key_state = [false; 8];

    loop {
        if !window.is_open() {
            break;
        }

        if let Err(e) = mbrd.next() {
            fatal(e);
        }

        // A completed frame: publish it and sample the inputs.
        if mbrd.check_and_reset_vblank() {
            for (i, w) in window_buffer.iter_mut().enumerate() {
                let pixel = &mbrd.framebuffer()[i * 4..i * 4 + 3];
                let r = u32::from(pixel[0]) << 16;
                let g = u32::from(pixel[1]) << 8;
                let b = u32::from(pixel[2]);
                *w = 0xff00_0000 | r | g | b;
            }
            window.update_with_buffer(window_buffer.as_slice()).unwrap();

            if window.is_key_down(minifb::Key::Escape) {
                break;
            }
            for (i, (pk, vk)) in keys.iter().enumerate() {
                let down = window.is_key_down(*pk);
                if down && !key_state[i] {
                    mbrd.keydown(*vk);
                } else if !down && key_state[i] {
                    mbrd.keyup(*vk);
                }
                key_state[i] = down;
            }
        }
    }
    mbrd.sav();
}

#[cfg(not(feature = "gui"))]
fn main() {
    rog::reg("beemo");
    rog::reg("beemo::cartridge");

    let (rom, bootrom, _, debug) = parse_args();
    let mbrd = match MotherBoard::power_up(rom, bootrom) {
        Ok(mbrd) => mbrd,
        Err(e) => fatal(e),
    };
    if !debug {
        fatal("Built without the gui feature; only --debug is available");
    }
    let mut debugger = Debugger::new(mbrd);
    if let Err(e) = debugger.run() {
        fatal(e);
    }
}
