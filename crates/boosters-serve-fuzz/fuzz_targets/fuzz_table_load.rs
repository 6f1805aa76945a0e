#![no_main]

use libfuzzer_sys::fuzz_target;

use boosters_serve::table::io::{TableFormat, load_as};

fuzz_target!(|data: &[u8]| {
    for format in [TableFormat::Csv, TableFormat::Parquet, TableFormat::Xlsx, TableFormat::Xls] {
        let _ = load_as(data, format);
    }
});
