//! The closed gesture vocabulary and its display text.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown gesture symbol '{0}'")]
pub struct UnknownSymbol(pub String);

macro_rules! vocabulary {
    ($($variant:ident => $name:literal, $text:literal;)*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "&'static str")]
        pub enum GestureSymbol {
            $($variant,)*
        }

        impl GestureSymbol {
            pub const ALL: &'static [GestureSymbol] = &[$(GestureSymbol::$variant,)*];

            pub fn as_str(self) -> &'static str {
                match self {
                    $(GestureSymbol::$variant => $name,)*
                }
            }

            /// Caption shown to the user when no profile override exists.
            pub fn display_text(self) -> &'static str {
                match self {
                    $(GestureSymbol::$variant => $text,)*
                }
            }
        }

        impl FromStr for GestureSymbol {
            type Err = UnknownSymbol;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($name => Ok(GestureSymbol::$variant),)*
                    other => Err(UnknownSymbol(other.to_string())),
                }
            }
        }
    };
}

vocabulary! {
    Idle => "idle", "";

    Hello => "hello", "Hello";
    Thanks => "thanks", "Thank you";
    Help => "help", "Help";
    Wait => "wait", "Wait";
    Repeat => "repeat", "Please repeat";
    Yes => "yes", "Yes";
    No => "no", "No";

    A => "a", "A";
    B => "b", "B";
    C => "c", "C";
    D => "d", "D";
    E => "e", "E";
    F => "f", "F";
    G => "g", "G";
    H => "h", "H";
    I => "i", "I";
    J => "j", "J";
    K => "k", "K";
    L => "l", "L";
    M => "m", "M";
    N => "n", "N";
    O => "o", "O";
    P => "p", "P";
    Q => "q", "Q";
    R => "r", "R";
    S => "s", "S";
    T => "t", "T";
    U => "u", "U";
    V => "v", "V";
    W => "w", "W";
    X => "x", "X";
    Y => "y", "Y";
    Z => "z", "Z";

    Zero => "0", "0";
    One => "1", "1";
    Two => "2", "2";
    Three => "3", "3";
    Four => "4", "4";
    Five => "5", "5";
    Six => "6", "6";
    Seven => "7", "7";
    Eight => "8", "8";
    Nine => "9", "9";
}

impl GestureSymbol {
    pub fn is_idle(self) -> bool {
        self == GestureSymbol::Idle
    }

    pub fn is_macro(self) -> bool {
        use GestureSymbol::*;
        matches!(self, Hello | Thanks | Help | Wait | Repeat | Yes | No)
    }
}

impl Default for GestureSymbol {
    fn default() -> Self {
        GestureSymbol::Idle
    }
}

impl fmt::Display for GestureSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for GestureSymbol {
    type Error = UnknownSymbol;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<GestureSymbol> for &'static str {
    fn from(s: GestureSymbol) -> Self {
        s.as_str()
    }
}
