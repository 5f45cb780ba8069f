mod entry;

pub(crate) use self::entry::{EntryRow, from_millis, millis};
