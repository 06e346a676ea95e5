use std::ops::BitAnd;

pub fn has_flag<U, T: Into<U>>(value: U, flag: T) -> bool
    where U: BitAnd<Output = U> + PartialEq + Copy {
    let flag = flag.into();

    value & flag == flag
}

/// Address of a runtime structure as it is written into a data segment slot. Compiled code treats
/// these as opaque immediates; nothing in this crate dereferences them again.
#[inline(always)]
pub fn address_of<T>(value: &T) -> u64 {
    value as *const T as usize as u64
}

/// Package part of an internal binary name (`java/lang/String` -> `java/lang`). Array names are
/// reduced to their element class first.
pub fn package_of(name: &str) -> &str {
    let name = name.trim_start_matches('[');
    let name = name.strip_prefix('L').and_then(|n| n.strip_suffix(';')).unwrap_or(name);

    match name.rfind('/') {
        Some(i) => &name[..i],
        None => ""
    }
}
