pub mod caller;
pub mod cinema;
pub mod movie;
pub mod pricing;
pub mod seat;
pub mod seat_map;
pub mod showtime;
pub mod theater;
pub mod ticket;

pub use caller::{Caller, Role};
pub use cinema::Cinema;
pub use movie::Movie;
pub use pricing::{PricingPolicy, PricingSection};
pub use seat::{ordinal_to_row, row_to_ordinal, SeatId, SeatParseError};
pub use seat_map::SeatMap;
pub use showtime::{ReservedSeat, Showtime};
pub use theater::Theater;
pub use ticket::Ticket;
