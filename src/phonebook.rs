//! Phonebook storage: fixed-size indexed entry tables keyed by phonebook
//! name (`"SM"`, `"FD"`, …), with the field-length invariants from the
//! `AT+CPBR=?` response tuple `(N,T,G,S,E,SIP,TEL)`.

use std::collections::HashMap;
use std::fmt;

pub const NAME_CAP: usize = 16;
pub const NUMBER_CAP: usize = 32;
pub const GROUP_CAP: usize = 255;
pub const SECOND_TEXT_CAP: usize = 16;
pub const EMAIL_CAP: usize = 255;
pub const SIP_URI_CAP: usize = 255;
pub const TEL_URI_CAP: usize = 255;

pub const HIDDEN_UNSET: i32 = -1;

/// Sentinel size the `"SM"` phonebook is always initialized with.
pub const DEFAULT_SM_SIZE: usize = 150;

#[derive(Debug, Clone, Default)]
pub struct PhonebookEntry {
    pub number: String,
    pub name: String,
    pub hidden: i32,
    pub group: String,
    pub additional_number: String,
    pub second_text: String,
    pub email: String,
    pub sip_uri: String,
    pub tel_uri: String,
}

impl PhonebookEntry {
    pub fn is_empty(&self) -> bool {
        self.number.is_empty()
    }

    fn empty() -> Self {
        Self {
            hidden: HIDDEN_UNSET,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct Phonebook {
    slots: Vec<PhonebookEntry>,
}

impl Phonebook {
    pub fn new(size: usize) -> Self {
        Self {
            slots: (0..size).map(|_| PhonebookEntry::empty()).collect(),
        }
    }

    pub fn size(&self) -> usize {
        self.slots.len()
    }

    pub fn used(&self) -> usize {
        self.slots.iter().filter(|e| !e.is_empty()).count()
    }

    /// 1-based slot lookup.
    pub fn get(&self, index: usize) -> Option<&PhonebookEntry> {
        if index == 0 {
            return None;
        }
        self.slots.get(index - 1)
    }

    pub fn in_range(&self, index: usize) -> bool {
        index >= 1 && index <= self.slots.len()
    }

    pub fn clear(&mut self, index: usize) -> Result<(), PhonebookError> {
        if !self.in_range(index) {
            return Err(PhonebookError::IndexOutOfRange(index));
        }
        self.slots[index - 1] = PhonebookEntry::empty();
        Ok(())
    }

    pub fn write(&mut self, index: usize, entry: PhonebookEntry) -> Result<(), PhonebookError> {
        if !self.in_range(index) {
            return Err(PhonebookError::IndexOutOfRange(index));
        }
        check_len(&entry.name, NAME_CAP)?;
        check_len(&entry.number, NUMBER_CAP)?;
        check_len(&entry.additional_number, NUMBER_CAP)?;
        check_len(&entry.group, GROUP_CAP)?;
        check_len(&entry.second_text, SECOND_TEXT_CAP)?;
        check_len(&entry.email, EMAIL_CAP)?;
        check_len(&entry.sip_uri, SIP_URI_CAP)?;
        check_len(&entry.tel_uri, TEL_URI_CAP)?;
        self.slots[index - 1] = entry;
        Ok(())
    }

    pub fn iter_occupied(&self, from: usize, to: usize) -> impl Iterator<Item = (usize, &PhonebookEntry)> {
        (from.max(1)..=to.min(self.slots.len()))
            .filter_map(move |i| self.get(i).filter(|e| !e.is_empty()).map(|e| (i, e)))
    }
}

#[derive(Debug, Default, Clone)]
pub struct PhonebookSet {
    books: HashMap<String, Phonebook>,
    current: String,
}

impl PhonebookSet {
    pub fn new() -> Self {
        let mut books = HashMap::new();
        books.insert("SM".to_string(), Phonebook::new(DEFAULT_SM_SIZE));
        Self {
            books,
            current: "SM".to_string(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, book: Phonebook) {
        self.books.insert(name.into(), book);
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.books.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn current_name(&self) -> &str {
        &self.current
    }

    pub fn current(&self) -> &Phonebook {
        self.books.get(&self.current).expect("current phonebook always exists")
    }

    pub fn current_mut(&mut self) -> &mut Phonebook {
        self.books.get_mut(&self.current).expect("current phonebook always exists")
    }

    pub fn get(&self, name: &str) -> Option<&Phonebook> {
        self.books.get(name)
    }

    pub fn select(&mut self, name: &str) -> Result<(), PhonebookError> {
        if !self.books.contains_key(name) {
            return Err(PhonebookError::UnknownBook(name.to_string()));
        }
        self.current = name.to_string();
        Ok(())
    }
}

fn check_len(field: &str, cap: usize) -> Result<(), PhonebookError> {
    if field.len() > cap {
        Err(PhonebookError::FieldTooLong { len: field.len(), cap })
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhonebookError {
    IndexOutOfRange(usize),
    FieldTooLong { len: usize, cap: usize },
    UnknownBook(String),
    WrongPassword,
}

impl fmt::Display for PhonebookError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PhonebookError::IndexOutOfRange(i) => write!(f, "phonebook index {} out of range", i),
            PhonebookError::FieldTooLong { len, cap } => {
                write!(f, "field length {} exceeds cap {}", len, cap)
            }
            PhonebookError::UnknownBook(name) => write!(f, "unknown phonebook \"{}\"", name),
            PhonebookError::WrongPassword => write!(f, "wrong phonebook password"),
        }
    }
}

impl std::error::Error for PhonebookError {}

/// Hex-encodes `text` as big-endian UTF-16 code units, used for textual
/// fields in `+CPBR:` output when `variable("SCS") == "UCS2"`. `number` and
/// `additional_number` are never subject to this encoding.
pub fn ucs2_hex_encode(text: &str) -> String {
    let mut out = String::with_capacity(text.len() * 4);
    for unit in text.encode_utf16() {
        out.push_str(&format!("{:04X}", unit));
    }
    out
}
