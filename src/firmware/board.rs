use corelink::sinks::{
    oled::{Ssd1306, TextPanel, DEFAULT_ADDRESS},
    rgb::PwmRgb,
};
use esp_hal::{
    gpio::DriveMode,
    i2c::master::{Config as I2cConfig, I2c, SoftwareTimeout},
    ledc::{
        channel::{self, Channel, ChannelIFace},
        timer::{self, LSClockSource, Timer, TimerIFace},
        LSGlobalClkSource, Ledc, LowSpeed,
    },
    peripherals::{GPIO21, GPIO22, GPIO25, GPIO26, GPIO27, I2C0, LEDC},
    time::{Duration as HalDuration, Rate},
    Blocking,
};
use static_cell::StaticCell;

pub(crate) type Panel = TextPanel<I2c<'static, Blocking>>;
pub(crate) type Led = PwmRgb<
    Channel<'static, LowSpeed>,
    Channel<'static, LowSpeed>,
    Channel<'static, LowSpeed>,
>;

const I2C_FREQUENCY_KHZ: u32 = 400;
const PWM_FREQUENCY_KHZ: u32 = 1;

pub(crate) fn status_panel(
    i2c0: I2C0<'static>,
    sda: GPIO21<'static>,
    scl: GPIO22<'static>,
) -> Result<Panel, &'static str> {
    let i2c_cfg = I2cConfig::default()
        .with_frequency(Rate::from_khz(I2C_FREQUENCY_KHZ))
        .with_software_timeout(SoftwareTimeout::Transaction(HalDuration::from_millis(40)));
    let i2c = I2c::new(i2c0, i2c_cfg)
        .map_err(|_| "i2c0 config rejected")?
        .with_sda(sda)
        .with_scl(scl);

    let mut oled = Ssd1306::new(i2c, DEFAULT_ADDRESS);
    oled.init().map_err(|err| err.as_str())?;
    Ok(TextPanel::new(oled))
}

pub(crate) fn rgb_led(
    ledc: LEDC<'static>,
    red: GPIO25<'static>,
    green: GPIO26<'static>,
    blue: GPIO27<'static>,
) -> Result<Led, &'static str> {
    static LEDC_CELL: StaticCell<Ledc<'static>> = StaticCell::new();
    static PWM_TIMER: StaticCell<Timer<'static, LowSpeed>> = StaticCell::new();

    let ledc = LEDC_CELL.init(Ledc::new(ledc));
    ledc.set_global_slow_clock(LSGlobalClkSource::APBClk);
    let ledc: &'static Ledc<'static> = ledc;

    let pwm_timer = PWM_TIMER.init(ledc.timer::<LowSpeed>(timer::Number::Timer0));
    pwm_timer
        .configure(timer::config::Config {
            duty: timer::config::Duty::Duty10Bit,
            clock_source: LSClockSource::APBClk,
            frequency: Rate::from_khz(PWM_FREQUENCY_KHZ),
        })
        .map_err(|_| "ledc timer config rejected")?;
    let pwm_timer: &'static Timer<'static, LowSpeed> = pwm_timer;

    let mut red = ledc.channel(channel::Number::Channel0, red);
    let mut green = ledc.channel(channel::Number::Channel1, green);
    let mut blue = ledc.channel(channel::Number::Channel2, blue);
    for pwm in [&mut red, &mut green, &mut blue] {
        pwm.configure(channel::config::Config {
            timer: pwm_timer,
            duty_pct: 0,
            drive_mode: DriveMode::PushPull,
        })
        .map_err(|_| "ledc channel config rejected")?;
    }

    Ok(PwmRgb::new(red, green, blue))
}
