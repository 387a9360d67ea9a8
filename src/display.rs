/// Display driver for M5StickC Plus2 (ST7789V2, 135x240, SPI).
///
/// Draws whatever screen the control loop last rendered: the scanning
/// status or an alert. Frames arrive through `DISPLAY_SIGNAL`; only the
/// newest one matters, so a slow redraw simply skips stale frames. Direct
/// SPI writes, no framebuffer (the 64KB required would exceed ESP32's heap).
use core::fmt::Write;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embedded_graphics::mono_font::ascii::{FONT_10X20, FONT_6X10};
use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};
use embedded_graphics::text::Text;
use embedded_hal_bus::spi::ExclusiveDevice;
use esp_hal::delay::Delay;
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::spi::master::{Config as SpiConfig, Spi};
use esp_hal::spi::Mode;
use esp_hal::time::Rate;
use mipidsi::interface::SpiInterface;
use mipidsi::models::ST7789;
use mipidsi::options::{ColorInversion, ColorOrder, Orientation, Rotation};
use mipidsi::Builder;

use embassy_time::{Duration, Timer};

use crate::board;
use crate::presentation::{Screen, StatusDisplay};
use crate::protocol::VERSION;

/// Landscape width after 90-degree rotation
const W: i32 = 240;

/// Colors
const BG: Rgb565 = Rgb565::BLACK;
const HEADER_BG: Rgb565 = Rgb565::new(2, 4, 12);
const ALERT_BG: Rgb565 = Rgb565::new(20, 0, 0);
const TEXT: Rgb565 = Rgb565::WHITE;
const ACCENT: Rgb565 = Rgb565::new(0, 50, 0);
const DIM: Rgb565 = Rgb565::new(12, 24, 12);

/// Newest frame from the control loop.
pub static DISPLAY_SIGNAL: Signal<CriticalSectionRawMutex, Screen> = Signal::new();

/// Control-loop side of the display: hands frames to `display_task`.
pub struct SignalDisplay;

impl StatusDisplay for SignalDisplay {
    fn render(&mut self, screen: &Screen) {
        DISPLAY_SIGNAL.signal(screen.clone());
    }
}

#[embassy_executor::task]
pub async fn display_task(
    spi2: esp_hal::peripherals::SPI2<'static>,
    mosi: esp_hal::peripherals::GPIO15<'static>,
    clk: esp_hal::peripherals::GPIO13<'static>,
    cs_pin: esp_hal::peripherals::GPIO5<'static>,
    dc_pin: esp_hal::peripherals::GPIO14<'static>,
    rst_pin: esp_hal::peripherals::GPIO12<'static>,
    bl_pin: esp_hal::peripherals::GPIO27<'static>,
) {
    // Turn on backlight
    let _bl = Output::new(bl_pin, Level::High, OutputConfig::default());

    // Configure SPI bus (40 MHz, Mode 0)
    let spi_config = SpiConfig::default()
        .with_frequency(Rate::from_mhz(board::DISPLAY_SPI_FREQ_MHZ))
        .with_mode(Mode::_0);
    let spi = match Spi::new(spi2, spi_config) {
        Ok(spi) => spi.with_sck(clk).with_mosi(mosi),
        Err(e) => {
            log::error!("Display SPI init failed: {:?}", e);
            return;
        }
    };

    // Wrap SpiBus + CS into SpiDevice
    let cs = Output::new(cs_pin, Level::High, OutputConfig::default());
    let Ok(spi_device) = ExclusiveDevice::new_no_delay(spi, cs) else {
        log::error!("Display SPI device init failed");
        return;
    };

    // Create mipidsi SPI interface (buffer on task stack)
    let dc = Output::new(dc_pin, Level::Low, OutputConfig::default());
    let mut buffer = [0u8; 512];
    let di = SpiInterface::new(spi_device, dc, &mut buffer);

    // Build display: ST7789V2, 135x240, landscape, inverted colors
    let rst = Output::new(rst_pin, Level::High, OutputConfig::default());
    let mut delay = Delay::new();
    let mut display = match Builder::new(ST7789, di)
        .display_size(board::DISPLAY_WIDTH, board::DISPLAY_HEIGHT)
        .display_offset(52, 40)
        .invert_colors(ColorInversion::Inverted)
        .color_order(ColorOrder::Bgr)
        .orientation(Orientation::new().rotate(Rotation::Deg90))
        .reset_pin(rst)
        .init(&mut delay)
    {
        Ok(display) => display,
        Err(_) => {
            log::error!("Display init failed, running headless");
            return;
        }
    };

    log::info!("Display initialized (240x135 landscape)");

    draw_splash(&mut display);
    Timer::after(Duration::from_secs(2)).await;

    loop {
        let screen = DISPLAY_SIGNAL.wait().await;
        draw_screen(&mut display, &screen);
    }
}

fn draw_splash(display: &mut impl DrawTarget<Color = Rgb565>) {
    let _ = display.clear(BG);

    let style = MonoTextStyle::new(&FONT_6X10, TEXT);
    let accent = MonoTextStyle::new(&FONT_6X10, ACCENT);

    // Center "SARHOUND" (8 chars × 6px = 48px)
    let _ = Text::new("SARHOUND", Point::new((W - 48) / 2, 55), style).draw(display);

    let mut ver = heapless::String::<20>::new();
    let _ = write!(ver, "v{}", VERSION);
    let vw = ver.len() as i32 * 6;
    let _ = Text::new(&ver, Point::new((W - vw) / 2, 70), accent).draw(display);

    let tag = "Search & Rescue";
    let tw = tag.len() as i32 * 6;
    let _ = Text::new(tag, Point::new((W - tw) / 2, 95), MonoTextStyle::new(&FONT_6X10, DIM)).draw(display);
}

/// Title line in the large font on a header bar, the rest below it.
fn draw_screen(display: &mut impl DrawTarget<Color = Rgb565>, screen: &Screen) {
    let _ = display.clear(BG);

    let title = screen.lines[0].as_str();
    let alert = title.contains("HIT");
    let header_bg = if alert { ALERT_BG } else { HEADER_BG };

    let _ = Rectangle::new(Point::zero(), Size::new(W as u32, 26))
        .into_styled(PrimitiveStyle::with_fill(header_bg))
        .draw(display);
    let _ = Text::new(title, Point::new(4, 19), MonoTextStyle::new(&FONT_10X20, TEXT)).draw(display);

    let body = MonoTextStyle::new(&FONT_10X20, if alert { TEXT } else { DIM });
    for (i, line) in screen.lines[1..].iter().enumerate() {
        let y = 54 + 28 * i as i32;
        let _ = Text::new(line, Point::new(4, y), body).draw(display);
    }
}
