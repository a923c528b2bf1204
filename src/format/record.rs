use std::marker::PhantomData;

use crate::{
    file::io::{read_le_at, write_le_at},
    format::SECTION_ALIGNMENT,
    Result,
};

/// A fixed-size, little-endian record stored back to back inside a section.
///
/// `ALIGN` is the alignment the record's fields would need if the buffer were reinterpreted
/// in place. Sections only guarantee [`SECTION_ALIGNMENT`], so a record with a stricter
/// alignment fails to compile as soon as a [`Section`] or [`SectionMut`] of it is created.
pub trait Record: Sized + Copy {
    /// Encoded size in bytes
    const SIZE: usize;

    /// Natural alignment of the encoded fields
    const ALIGN: usize;

    /// Evaluated at monomorphization; rejects records that sections cannot hold.
    const ASSERT_ALIGN: () = assert!(
        Self::ALIGN <= SECTION_ALIGNMENT,
        "record alignment exceeds the section alignment"
    );

    /// Decode one record at `offset`, advancing it by [`Record::SIZE`].
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the record does not fit.
    fn read(data: &[u8], offset: &mut usize) -> Result<Self>;

    /// Encode this record at `offset`, advancing it by [`Record::SIZE`].
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the record does not fit, or
    /// [`crate::Error::Malformed`] if a field exceeds its encoded width.
    fn write(&self, data: &mut [u8], offset: &mut usize) -> Result<()>;
}

impl Record for u32 {
    const SIZE: usize = 4;
    const ALIGN: usize = 4;

    fn read(data: &[u8], offset: &mut usize) -> Result<Self> {
        read_le_at(data, offset)
    }

    fn write(&self, data: &mut [u8], offset: &mut usize) -> Result<()> {
        write_le_at(data, offset, *self)
    }
}

/// A read-only, typed view over a run of records borrowed from the container.
///
/// Records are decoded on access; the section itself never copies the buffer.
///
/// # Examples
///
/// ```rust
/// use hbcscope::format::Section;
///
/// let bytes = [1u8, 0, 0, 0, 2, 0, 0, 0];
/// let section = Section::<u32>::new(&bytes)?;
/// assert_eq!(section.len(), 2);
/// assert_eq!(section.get(1), Some(2));
/// assert_eq!(section.iter().sum::<u32>(), 3);
/// # Ok::<(), hbcscope::Error>(())
/// ```
pub struct Section<'a, T> {
    data: &'a [u8],
    _marker: PhantomData<T>,
}

impl<T> Clone for Section<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Section<'_, T> {}

impl<T> std::fmt::Debug for Section<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Section")
            .field("bytes", &self.data.len())
            .field("record", &std::any::type_name::<T>())
            .finish()
    }
}

impl<'a, T: Record> Section<'a, T> {
    /// Create a view over `data`, which must hold a whole number of records.
    ///
    /// # Errors
    /// Returns [`crate::Error::InternalConsistency`] if `data.len()` is not a multiple of
    /// [`Record::SIZE`].
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let () = T::ASSERT_ALIGN;
        if data.len() % T::SIZE != 0 {
            return Err(internal_consistency_error!(
                "{} bytes is not a whole number of {}-byte records",
                data.len(),
                T::SIZE
            ));
        }

        Ok(Section {
            data,
            _marker: PhantomData,
        })
    }

    /// An empty section.
    #[must_use]
    pub fn empty() -> Self {
        let () = T::ASSERT_ALIGN;
        Section {
            data: &[],
            _marker: PhantomData,
        }
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len() / T::SIZE
    }

    /// Returns `true` if the section holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Decode the record at `index`, or `None` if `index` is out of range.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<T> {
        if index >= self.len() {
            return None;
        }

        T::read(self.data, &mut (index * T::SIZE)).ok()
    }

    /// The raw bytes covered by this section.
    #[must_use]
    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    /// Iterate over the records in table order.
    #[must_use]
    pub fn iter(&self) -> SectionIter<'a, T> {
        SectionIter {
            data: self.data,
            offset: 0,
            _marker: PhantomData,
        }
    }
}

impl<'a, T: Record> IntoIterator for &Section<'a, T> {
    type Item = T;
    type IntoIter = SectionIter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the records of a [`Section`].
pub struct SectionIter<'a, T> {
    data: &'a [u8],
    offset: usize,
    _marker: PhantomData<T>,
}

impl<T: Record> Iterator for SectionIter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset + T::SIZE > self.data.len() {
            return None;
        }

        T::read(self.data, &mut self.offset).ok()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.data.len() - self.offset) / T::SIZE;
        (remaining, Some(remaining))
    }
}

impl<T: Record> ExactSizeIterator for SectionIter<'_, T> {}

/// A mutable, typed view over a run of records inside a caller-owned buffer.
pub struct SectionMut<'a, T> {
    data: &'a mut [u8],
    _marker: PhantomData<T>,
}

impl<'a, T: Record> SectionMut<'a, T> {
    /// Create a mutable view over `data`, which must hold a whole number of records.
    ///
    /// # Errors
    /// Returns [`crate::Error::InternalConsistency`] if `data.len()` is not a multiple of
    /// [`Record::SIZE`].
    pub fn new(data: &'a mut [u8]) -> Result<Self> {
        let () = T::ASSERT_ALIGN;
        if data.len() % T::SIZE != 0 {
            return Err(internal_consistency_error!(
                "{} bytes is not a whole number of {}-byte records",
                data.len(),
                T::SIZE
            ));
        }

        Ok(SectionMut {
            data,
            _marker: PhantomData,
        })
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len() / T::SIZE
    }

    /// Returns `true` if the section holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Decode the record at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<T> {
        if index >= self.len() {
            return None;
        }

        T::read(&*self.data, &mut (index * T::SIZE)).ok()
    }

    /// Overwrite the record at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `index` is out of range, or the record's
    /// encoding error.
    pub fn set(&mut self, index: usize, value: &T) -> Result<()> {
        if index >= self.len() {
            return Err(crate::Error::OutOfBounds);
        }

        value.write(&mut *self.data, &mut (index * T::SIZE))
    }

    /// Reborrow as a read-only [`Section`].
    #[must_use]
    pub fn as_section(&self) -> Section<'_, T> {
        Section {
            data: &*self.data,
            _marker: PhantomData,
        }
    }

    /// The raw bytes covered by this section.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut *self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_rejects_partial_records() {
        let bytes = [0u8; 6];
        assert!(matches!(
            Section::<u32>::new(&bytes),
            Err(crate::Error::InternalConsistency { .. })
        ));
    }

    #[test]
    fn section_get_and_iter() {
        let bytes = [7u8, 0, 0, 0, 8, 0, 0, 0, 9, 0, 0, 0];
        let section = Section::<u32>::new(&bytes).unwrap();
        assert_eq!(section.len(), 3);
        assert_eq!(section.get(0), Some(7));
        assert_eq!(section.get(2), Some(9));
        assert_eq!(section.get(3), None);
        assert_eq!(section.iter().len(), 3);
        assert_eq!((&section).into_iter().collect::<Vec<_>>(), vec![7, 8, 9]);
        assert_eq!(section.as_bytes().as_ptr(), bytes.as_ptr());
    }

    #[test]
    fn empty_section() {
        let section = Section::<u32>::empty();
        assert!(section.is_empty());
        assert_eq!(section.iter().next(), None);
    }

    #[test]
    fn section_mut_set() {
        let mut bytes = [0u8; 8];
        {
            let mut section = SectionMut::<u32>::new(&mut bytes).unwrap();
            section.set(1, &0x0102_0304).unwrap();
            assert!(section.set(2, &1).is_err());
            assert_eq!(section.get(1), Some(0x0102_0304));
            assert_eq!(section.as_section().len(), 2);
        }
        assert_eq!(bytes, [0, 0, 0, 0, 4, 3, 2, 1]);
    }
}
