#![forbid(unsafe_code)]

use kilntool::KilntoolError;

fn main() -> Result<(), KilntoolError> {
    kilntool::run()
}
