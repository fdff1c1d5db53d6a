use embedded_hal::pwm::SetDutyCycle;

use super::{Indicator, Rgb};

/// RGB LED driven by three PWM channels.
pub struct PwmRgb<R, G, B> {
    red: R,
    green: G,
    blue: B,
    current: Rgb,
}

impl<R, G, B> PwmRgb<R, G, B>
where
    R: SetDutyCycle,
    G: SetDutyCycle,
    B: SetDutyCycle,
{
    pub fn new(red: R, green: G, blue: B) -> Self {
        let mut led = Self {
            red,
            green,
            blue,
            current: Rgb::WHITE,
        };
        led.set_color(Rgb::OFF);
        led
    }

    pub fn current(&self) -> Rgb {
        self.current
    }

    pub fn release(self) -> (R, G, B) {
        (self.red, self.green, self.blue)
    }
}

impl<R, G, B> Indicator for PwmRgb<R, G, B>
where
    R: SetDutyCycle,
    G: SetDutyCycle,
    B: SetDutyCycle,
{
    fn set_color(&mut self, color: Rgb) {
        if color == self.current {
            return;
        }
        let red = self.red.set_duty_cycle_fraction(color.r, u16::MAX);
        let green = self.green.set_duty_cycle_fraction(color.g, u16::MAX);
        let blue = self.blue.set_duty_cycle_fraction(color.b, u16::MAX);
        if red.is_err() || green.is_err() || blue.is_err() {
            log::warn!(
                "rgb: duty update failed r={} g={} b={}",
                red.is_ok(),
                green.is_ok(),
                blue.is_ok()
            );
        }
        self.current = color;
    }
}
