//! Feature selection: document-frequency prefilter, information gain and
//! the language-domain score built from them

pub mod df;
pub mod ig;
pub mod ld;

pub use df::{df_tally, select_df, DfSelection, DocFrequency};
pub use ig::{compute_ig, IgTable, IgWeights};
pub use ld::{select_ld, union_features};
