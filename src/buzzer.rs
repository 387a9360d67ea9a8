/// Buzzer driver using LEDC PWM.
///
/// Plays the tone pattern of each rendered alert on a passive buzzer. The
/// two alert tiers use different pitches, so each gets its own LEDC timer
/// and the channel is re-bound per pattern.
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer};
use esp_hal::gpio::DriveMode;
use esp_hal::ledc::channel::{self, ChannelIFace};
use esp_hal::ledc::timer::{self, config::Duty, TimerIFace};
use esp_hal::ledc::{Ledc, LowSpeed};
use esp_hal::time::Rate;

use crate::board;
use crate::presentation::{TonePattern, POSSIBLE_HIT_TONE, TRUE_HIT_TONE};

/// Pattern for the alert just drawn. A newer alert replaces one not yet
/// started.
pub static BUZZER_SIGNAL: Signal<CriticalSectionRawMutex, TonePattern> = Signal::new();

type BuzzerPin = esp_hal::peripherals::GPIO2<'static>;

#[embassy_executor::task]
pub async fn buzzer_task(ledc_peripheral: esp_hal::peripherals::LEDC<'static>, buzzer_pin: BuzzerPin) {
    let ledc = Ledc::new(ledc_peripheral);

    let mut high = ledc.timer::<LowSpeed>(timer::Number::Timer0);
    let mut low = ledc.timer::<LowSpeed>(timer::Number::Timer1);
    for (t, tone) in [(&mut high, TRUE_HIT_TONE), (&mut low, POSSIBLE_HIT_TONE)] {
        if let Err(e) = t.configure(timer::config::Config {
            duty: Duty::Duty8Bit,
            clock_source: timer::LSClockSource::APBClk,
            frequency: Rate::from_hz(tone.freq_hz),
        }) {
            log::error!("Buzzer timer init failed: {:?}", e);
            return;
        }
    }

    let mut channel0 = ledc.channel(channel::Number::Channel0, buzzer_pin);

    log::info!("Buzzer ready on GPIO{}", board::BUZZER_PIN);

    loop {
        let tone = BUZZER_SIGNAL.wait().await;
        let timer = if tone.freq_hz == TRUE_HIT_TONE.freq_hz { &high } else { &low };
        if let Err(e) = channel0.configure(channel::config::Config {
            timer,
            duty_pct: 0,
            drive_mode: DriveMode::PushPull,
        }) {
            log::warn!("Buzzer channel setup failed: {:?}", e);
            continue;
        }

        for beep in 0..tone.beeps {
            if beep > 0 {
                Timer::after(Duration::from_millis(u64::from(tone.gap_ms))).await;
            }
            // 50% duty = loudest for passive buzzer
            let _ = channel0.set_duty(50);
            Timer::after(Duration::from_millis(u64::from(tone.beep_ms))).await;
            let _ = channel0.set_duty(0);
        }
    }
}
