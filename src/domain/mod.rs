pub mod scanreport;
