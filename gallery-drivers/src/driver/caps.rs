use bitflags::bitflags;

bitflags! {
    /// Operations a driver can actually serve.
    ///
    /// Every driver implements the whole [`Driver`](crate::driver::Driver) trait, but some
    /// sources have nothing behind a given operation. A host that needs to tell "this post has
    /// no comments" from "this source has no comments" checks these flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DriverFeatures: u8 {
        const TAG_SEARCH = 0b0000_0001;
        const SINGLE_POST_FETCH = 0b0000_0010;
        const FILE_FETCH = 0b0000_0100;
        const COMMENTS = 0b0000_1000;
    }
}
