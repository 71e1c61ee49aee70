//! Three-button operator menu as a pure state machine.
//!
//! The menu only tracks which screen is up and the value being edited. It
//! reports committed edits and view requests as [`MenuEffect`]s; the
//! controller applies them and does the rendering that needs live data.

use dispenser_traits::Funnel;

use crate::config::CounterCfg;
use crate::inventory::{ButtonCounter, Inventory};
use crate::press::PressEvent;
use crate::schedule::{DAY_NAMES, Schedule};

/// Physical button roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuButton {
    /// B1: edit / increment.
    Set,
    /// B2: confirm / inventory.
    Confirm,
    /// B3: time remaining / back.
    Time,
}

impl MenuButton {
    pub const ALL: [MenuButton; 3] = [MenuButton::Set, MenuButton::Confirm, MenuButton::Time];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Day,
    Hour,
    Minute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountPurpose {
    /// First start without saved state.
    Initial,
    Refill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Screen {
    Main,
    Edit {
        funnel: Funnel,
        field: Field,
        day: u8,
        hour: u8,
        minute: u8,
    },
    Count {
        funnel: Funnel,
        purpose: CountPurpose,
        counter: ButtonCounter,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuEffect {
    /// The prompt changed; redraw it.
    Redraw,
    ScheduleSet(Funnel, Schedule),
    CountSet {
        funnel: Funnel,
        count: u32,
        purpose: CountPurpose,
    },
    ShowInventory,
    ShowTimeRemaining,
    BackToMain,
    EditCancelled,
}

#[derive(Debug, Clone)]
pub struct Menu {
    screen: Screen,
    counter_cfg: CounterCfg,
}

impl Menu {
    pub fn new(counter_cfg: CounterCfg) -> Self {
        Self {
            screen: Screen::Main,
            counter_cfg,
        }
    }

    pub fn is_main(&self) -> bool {
        self.screen == Screen::Main
    }

    /// Ask the operator for both funnels' pill counts, starting from zero.
    pub fn begin_cold_start(&mut self) {
        self.screen = Screen::Count {
            funnel: Funnel::One,
            purpose: CountPurpose::Initial,
            counter: ButtonCounter::new(0, self.counter_cfg),
        };
    }

    fn edit(funnel: Funnel) -> Screen {
        Screen::Edit {
            funnel,
            field: Field::Day,
            day: 0,
            hour: 0,
            minute: 0,
        }
    }

    pub fn handle(
        &mut self,
        button: MenuButton,
        event: PressEvent,
        inventory: &Inventory,
    ) -> Option<MenuEffect> {
        use MenuButton::*;
        use PressEvent::{Double, Single};

        match (self.screen, button, event) {
            (_, _, PressEvent::None) => None,

            (Screen::Main, Set, Single) => {
                self.screen = Self::edit(Funnel::One);
                Some(MenuEffect::Redraw)
            }
            (Screen::Main, Set, Double) => {
                self.screen = Screen::Count {
                    funnel: Funnel::One,
                    purpose: CountPurpose::Refill,
                    counter: ButtonCounter::new(inventory.get(Funnel::One), self.counter_cfg),
                };
                Some(MenuEffect::Redraw)
            }
            (Screen::Main, Confirm, Single) => Some(MenuEffect::ShowInventory),
            (Screen::Main, Time, Single) => Some(MenuEffect::ShowTimeRemaining),
            (Screen::Main, Time, Double) => Some(MenuEffect::BackToMain),

            (Screen::Edit { .. }, Time, Double) => {
                self.screen = Screen::Main;
                Some(MenuEffect::EditCancelled)
            }
            (
                Screen::Edit {
                    funnel,
                    field,
                    mut day,
                    mut hour,
                    mut minute,
                },
                Set,
                Single,
            ) => {
                match field {
                    Field::Day => day = (day + 1) % 7,
                    Field::Hour => hour = (hour + 1) % 24,
                    Field::Minute => minute = (minute + 1) % 60,
                }
                self.screen = Screen::Edit {
                    funnel,
                    field,
                    day,
                    hour,
                    minute,
                };
                Some(MenuEffect::Redraw)
            }
            (
                Screen::Edit {
                    funnel,
                    field,
                    day,
                    hour,
                    minute,
                },
                Set,
                Double,
            ) => {
                let next = match field {
                    Field::Day => Field::Hour,
                    Field::Hour => Field::Minute,
                    Field::Minute => {
                        let schedule = Schedule::new(day, hour, minute)?;
                        self.screen = match funnel {
                            Funnel::One => Self::edit(Funnel::Two),
                            Funnel::Two => Screen::Main,
                        };
                        return Some(MenuEffect::ScheduleSet(funnel, schedule));
                    }
                };
                self.screen = Screen::Edit {
                    funnel,
                    field: next,
                    day,
                    hour,
                    minute,
                };
                Some(MenuEffect::Redraw)
            }

            (
                Screen::Count {
                    funnel,
                    purpose,
                    mut counter,
                },
                Set,
                Single,
            ) => {
                counter.increment();
                self.screen = Screen::Count {
                    funnel,
                    purpose,
                    counter,
                };
                Some(MenuEffect::Redraw)
            }
            (
                Screen::Count {
                    funnel,
                    purpose,
                    counter,
                },
                Confirm,
                Single,
            ) => {
                self.screen = match funnel {
                    Funnel::One => Screen::Count {
                        funnel: Funnel::Two,
                        purpose,
                        counter: ButtonCounter::new(
                            match purpose {
                                CountPurpose::Initial => 0,
                                CountPurpose::Refill => inventory.get(Funnel::Two),
                            },
                            self.counter_cfg,
                        ),
                    },
                    Funnel::Two => Screen::Main,
                };
                Some(MenuEffect::CountSet {
                    funnel,
                    count: counter.value(),
                    purpose,
                })
            }

            _ => None,
        }
    }

    /// Prompt for the current screen.
    pub fn prompt(&self) -> (String, String) {
        match self.screen {
            Screen::Main => ("> Daily Dose".into(), "1:Set 2:Inv 3:Time".into()),
            Screen::Edit {
                funnel,
                field,
                day,
                hour,
                minute,
            } => {
                let n = funnel.number();
                match field {
                    Field::Day => (
                        format!("Set Funnel {n} Day:"),
                        DAY_NAMES[usize::from(day) % 7].to_string(),
                    ),
                    Field::Hour => (format!("Set Funnel {n} Hour:"), format!("{hour:02}")),
                    Field::Minute => (format!("Set Funnel {n} Minute:"), format!("{minute:02}")),
                }
            }
            Screen::Count {
                funnel,
                purpose,
                counter,
            } => {
                let n = funnel.number();
                let title = match purpose {
                    CountPurpose::Initial => format!("Init Funnel {n} Pills:"),
                    CountPurpose::Refill => format!("Refill Funnel {n}:"),
                };
                (
                    title,
                    format!(
                        "Count: {:02}  (B1:+{}  B2:OK)",
                        counter.value(),
                        self.counter_cfg.step
                    ),
                )
            }
        }
    }
}
