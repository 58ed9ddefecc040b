//! # Plate Normalization
//!
//! Turns noisy OCR text into registration-number candidates.
//!
//! A sticker crop usually reads as a few short lines: the plate itself split over one or two lines,
//! plus the manufacturer badge, the `IND` country marker and stray punctuation. Lines that are known
//! noise, carry no letters or digits, or are too short/long to be part of a plate are dropped. What
//! survives is glued together and stripped of spaces, dots and hyphens.
use std::sync::LazyLock;

use regex::Regex;

use remote::OcrTextBlock;

const MIN_LINE_CHARS: usize = 2;
const MAX_LINE_CHARS: usize = 10;

pub const DENYLIST: &[&str] = &[
    "IND",
    " ",
    "-",
    "_",
    "MARUTI SUZUKI",
    "HYUNDAI",
    "TATA MOTORS",
    "MAHINDRA & MAHINDRA",
    "TOYOTA",
    "HONDA",
    "FORD",
    "RENAULT",
    "NISSAN",
    "VOLKSWAGEN",
    "MERCEDES-BENZ",
    "BMW",
    "AUDI",
    "SKODA",
    "VOLVO",
    "JEEP",
    "KIA",
    "MG MOTOR",
    "JAGUAR LAND ROVER",
    "FIAT",
    "LAMBORGHINI",
    "PORSCHE",
    "ROLLS-ROYCE",
    "BENTLEY",
    "ASTON MARTIN",
    "FERRARI",
    "MASERATI",
    "ISUZU",
    "FORCE MOTORS",
    "PREMIER",
    "BAJAJ AUTO",
    "TVS MOTORS",
    "HERO MOTOCORP",
    "ROYAL ENFIELD",
    "MAHINDRA TWO WHEELERS",
    "YAMAHA",
    "SUZUKI MOTORCYCLE",
    "KAWASAKI",
    "TRIUMPH MOTORCYCLES",
    "HARLEY-DAVIDSON",
    "HYOSUNG",
    "INDIAN MOTORCYCLE",
    "PIAGGIO",
    "DUCATI",
    "APRILIA",
    "BENELLI",
    "MV AGUSTA",
    "NORTON",
    "HUSQVARNA",
    "BMW MOTORRAD",
    "KTM",
    "JAWA",
    "KYMCO",
    "KAUN",
    "OLA ELECTRIC",
];

static SEPARATORS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ .\-]").unwrap());

pub fn normalize(text: &str) -> String {
    let joined: String = text
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| keep_line(line))
        .collect();

    SEPARATORS.replace_all(&joined, "").into_owned()
}

fn keep_line(line: &str) -> bool {
    if DENYLIST.contains(&line) {
        return false;
    }

    if !line.chars().any(char::is_alphanumeric) {
        return false;
    }

    (MIN_LINE_CHARS..=MAX_LINE_CHARS).contains(&line.chars().count())
}

/// One candidate per non-empty block, in block order. Duplicates are kept.
pub fn extract(blocks: &[Option<OcrTextBlock>]) -> Vec<String> {
    blocks
        .iter()
        .flatten()
        .map(|block| normalize(block))
        .filter(|candidate| !candidate.is_empty())
        .collect()
}
